//! Certificate composer
//!
//! Declares a cert-manager Certificate and derives the name of the Secret
//! the issuance controller will write. The secret name is a pure function of
//! the logical name, so consumers (an HTTP route's TLS block) can reference
//! it before the controller has issued anything.

use serde::{Deserialize, Serialize};
use tracing::debug;

use homelab_common::{
    Component, ComponentUnit, Deferred, Error, HasApiResource, ObjectMeta, Result, Stack, Urn,
};

use crate::namespace::ScopeHandle;

/// ClusterIssuer used when the caller doesn't name one
pub const DEFAULT_ISSUER: &str = "cert-manager-lets-encrypt-issuer";

/// Name of the Secret holding the issued certificate for `name`
pub fn secret_name_for(name: &str) -> String {
    format!("{}-certificate", name)
}

// =============================================================================
// Certificate Types (cert-manager)
// =============================================================================

/// cert-manager Certificate resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// API version (cert-manager.io/v1)
    #[serde(default = "Certificate::default_api_version")]
    pub api_version: String,
    /// Resource kind (Certificate)
    #[serde(default = "Certificate::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Certificate specification
    pub spec: CertificateSpec,
}

impl HasApiResource for Certificate {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "Certificate";
}

impl_api_defaults!(Certificate);

impl Certificate {
    /// Create a new Certificate
    pub fn new(metadata: ObjectMeta, spec: CertificateSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Certificate spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Common name
    pub common_name: String,
    /// Name of the Secret to store the certificate
    pub secret_name: String,
    /// DNS names for the certificate
    pub dns_names: Vec<String>,
    /// Reference to the issuer
    pub issuer_ref: IssuerRef,
}

/// Issuer reference for Certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    /// Issuer name
    pub name: String,
    /// Issuer kind (Issuer or ClusterIssuer)
    pub kind: String,
    /// API group (cert-manager.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Default for IssuerRef {
    fn default() -> Self {
        Self {
            name: DEFAULT_ISSUER.to_string(),
            kind: "ClusterIssuer".to_string(),
            group: None,
        }
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Arguments for [`ManagedCertificate`]
#[derive(Clone, Debug)]
pub struct CertificateArgs {
    /// Domain the certificate is issued for
    pub domain: String,
    /// Namespace to declare the Certificate in
    pub scope: ScopeHandle,
    /// Issuer; the Let's Encrypt ClusterIssuer when unset
    pub issuer: Option<IssuerRef>,
}

/// What a certificate composition hands back
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateHandle {
    domain: String,
    secret_name: Deferred<String>,
    request: Urn,
}

impl CertificateHandle {
    /// Domain the certificate covers
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Secret the issued certificate lands in
    pub fn secret_name(&self) -> &Deferred<String> {
        &self.secret_name
    }

    /// URN of the Certificate declaration
    pub fn request(&self) -> &Urn {
        &self.request
    }
}

/// Declares one cert-manager Certificate for a domain
pub struct ManagedCertificate;

impl ManagedCertificate {
    /// Build the Certificate body for `name`
    pub fn build(name: &str, namespace: &str, domain: &str, issuer: IssuerRef) -> Certificate {
        let secret_name = secret_name_for(name);
        Certificate::new(
            ObjectMeta::new(secret_name.clone(), namespace),
            CertificateSpec {
                common_name: domain.to_string(),
                secret_name,
                dns_names: vec![domain.to_string()],
                issuer_ref: issuer,
            },
        )
    }
}

/// Trimmed domain, or a validation error if it is blank or can't sit in a
/// Host(`...`) rule or a dnsNames entry
pub(crate) fn check_domain<'a>(unit: &str, domain: &'a str) -> Result<&'a str> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(Error::validation_for_field(unit, "domain", "domain must not be empty"));
    }
    if domain.contains(|c: char| c == '`' || c.is_whitespace()) {
        return Err(Error::validation_for_field(
            unit,
            "domain",
            format!("domain '{}' must not contain whitespace or backticks", domain),
        ));
    }
    Ok(domain)
}

impl Component for ManagedCertificate {
    const TYPE: &'static str = "homelab:resources:Certificate";
    type Args = CertificateArgs;
    type Output = CertificateHandle;

    fn compose(stack: &mut Stack, unit: &ComponentUnit, args: CertificateArgs) -> Result<Self::Output> {
        let name = unit.name();
        let domain = check_domain(name, &args.domain)?.to_string();

        let mut opts = unit.child_opts();
        let namespace = args.scope.namespace().read(&mut opts).clone();
        let certificate = Self::build(
            name,
            &namespace,
            &domain,
            args.issuer.unwrap_or_default(),
        );

        let declared = stack.declare_object(&secret_name_for(name), &certificate, opts)?;
        debug!(
            certificate = %name,
            domain = %domain,
            secret = %certificate.spec.secret_name,
            "declared certificate request"
        );

        Ok(CertificateHandle {
            domain,
            secret_name: Deferred::produced_by(declared.urn(), certificate.spec.secret_name),
            request: declared.urn().clone(),
        })
    }
}
