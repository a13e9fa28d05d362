//! Fixed template catalog.
//!
//! Templates are pre-approved on the provider side, so the mapping from
//! [`TemplateKind`] to provider template is compiled in and not editable at
//! runtime. Parameters are positional (`{{1}}`, `{{2}}`, ...) in the order listed
//! by [`TemplateSpec::params`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use leasekeep_core::ValueObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Rent agreement reaching its end date.
    LeaseExpiry,
    /// Maintenance contract service or renewal coming due.
    MaintenanceDue,
    /// Invoice payment coming due.
    InvoiceDue,
}

/// Provider-side template definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Template name registered with the provider.
    pub name: &'static str,
    /// Body as registered, used for previews and log-only delivery.
    pub body: &'static str,
    /// Parameter names in positional order.
    pub params: &'static [&'static str],
}

const LEASE_EXPIRY: TemplateSpec = TemplateSpec {
    name: "lease_expiry_reminder",
    body: "Dear {{1}}, your rent agreement for unit {{3}} at {{2}} ends on {{4}}. Please contact the office to renew or arrange move-out.",
    params: &["renter_name", "property_name", "unit_number", "end_date"],
};

const MAINTENANCE_DUE: TemplateSpec = TemplateSpec {
    name: "maintenance_contract_due",
    body: "Hello {{1}}, the maintenance contract \"{{3}}\" at {{2}} is due on {{4}}.",
    params: &["contact_name", "property_name", "description", "due_date"],
};

const INVOICE_DUE: TemplateSpec = TemplateSpec {
    name: "invoice_payment_reminder",
    body: "Dear {{1}}, invoice {{2}} for {{3}} is due on {{4}}. Kindly arrange payment.",
    params: &["renter_name", "invoice_number", "amount", "due_date"],
};

impl TemplateKind {
    pub fn spec(&self) -> &'static TemplateSpec {
        match self {
            TemplateKind::LeaseExpiry => &LEASE_EXPIRY,
            TemplateKind::MaintenanceDue => &MAINTENANCE_DUE,
            TemplateKind::InvoiceDue => &INVOICE_DUE,
        }
    }

    /// Render candidate parameters into the positional list the provider expects.
    pub fn render(
        &self,
        params: &BTreeMap<String, String>,
        language: &str,
    ) -> Result<RenderedTemplate, MissingParam> {
        let spec = self.spec();
        let mut values = Vec::with_capacity(spec.params.len());
        for name in spec.params {
            match params.get(*name) {
                Some(v) if !v.trim().is_empty() => values.push(v.trim().to_string()),
                _ => return Err(MissingParam(name)),
            }
        }

        Ok(RenderedTemplate {
            template_id: spec.name.to_string(),
            language: language.to_string(),
            params: values,
        })
    }
}

/// A required template parameter was absent or blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing template parameter: {0}")]
pub struct MissingParam(pub &'static str);

/// Template resolved and filled for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplate {
    pub template_id: String,
    pub language: String,
    pub params: Vec<String>,
}

impl ValueObject for RenderedTemplate {}

impl RenderedTemplate {
    /// Human-readable text, substituting positional placeholders in the body.
    ///
    /// Returns `None` when the template id is not in the catalog.
    pub fn preview(&self) -> Option<String> {
        let spec = [LEASE_EXPIRY, MAINTENANCE_DUE, INVOICE_DUE]
            .into_iter()
            .find(|s| s.name == self.template_id)?;

        let mut text = spec.body.to_string();
        for (i, value) in self.params.iter().enumerate() {
            text = text.replace(&format!("{{{{{}}}}}", i + 1), value);
        }
        Some(text)
    }
}
