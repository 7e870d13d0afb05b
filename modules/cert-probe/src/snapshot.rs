use anyhow::{anyhow, Result};
use certmon_core::{CertificateSnapshot, SubjectFields};
use rustls::pki_types::CertificateDer;
use x509_parser::prelude::*;

/// Read expiry and subject from the leaf (first) certificate of a chain.
pub fn snapshot_from_chain(chain: &[CertificateDer<'_>]) -> Result<CertificateSnapshot> {
    let leaf = chain.first().ok_or_else(|| anyhow!("empty certificate chain"))?;
    let (_, x509) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| anyhow!("failed to parse leaf certificate: {}", e))?;
    let name = x509.subject();
    let subject = SubjectFields {
        country: strings(name.iter_country()),
        province: strings(name.iter_state_or_province()),
        locality: strings(name.iter_locality()),
        organization: strings(name.iter_organization()),
        organizational_unit: strings(name.iter_organizational_unit()),
        common_name: strings(name.iter_common_name()).into_iter().next().unwrap_or_default(),
    };
    Ok(CertificateSnapshot { not_after: x509.validity().not_after.to_datetime(), subject })
}

fn strings<'a, 'b: 'a>(attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
    attrs.filter_map(|a| a.as_str().ok()).map(str::to_string).collect()
}
