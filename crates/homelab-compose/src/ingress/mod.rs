//! Ingress module for Traefik routes
//!
//! This module provides types and compilation logic for:
//! - **IngressRoute**: HTTP routing on the `web`/`web-secure` entry points,
//!   terminated with a cert-manager certificate
//! - **IngressRouteTCP / IngressRouteUDP**: raw L4 routing on caller-chosen
//!   entry points, matching every SNI host
//!
//! Compilation is split from declaration: [`IngressCompiler`] turns a
//! [`RoutingIntent`] into typed bodies without touching a stack, and the
//! [`Ingress`] component registers what it produced.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use homelab_common::{
    Component, ComponentUnit, Deferred, Error, HasApiResource, ObjectMeta, Result, Stack,
};

use crate::certificate::{check_domain, secret_name_for, CertificateArgs, ManagedCertificate};
use crate::namespace::ScopeHandle;

/// Entry points every HTTP route listens on
pub const HTTP_ENTRY_POINTS: [&str; 2] = ["web", "web-secure"];

/// Match expression for L4 routes (any SNI host)
pub const MATCH_ANY_SNI: &str = "HostSNI(`*`)";

/// Traefik route rule kind
const ROUTE_KIND_RULE: &str = "Rule";

// =============================================================================
// Traefik Types
// =============================================================================

/// Traefik IngressRoute (HTTP)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRoute {
    /// API version (traefik.containo.us/v1alpha1)
    #[serde(default = "IngressRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (IngressRoute)
    #[serde(default = "IngressRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Route specification
    pub spec: IngressRouteSpec,
}

impl HasApiResource for IngressRoute {
    const API_VERSION: &'static str = "traefik.containo.us/v1alpha1";
    const KIND: &'static str = "IngressRoute";
}

impl_api_defaults!(IngressRoute);

impl IngressRoute {
    /// Create a new IngressRoute
    pub fn new(metadata: ObjectMeta, spec: IngressRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// IngressRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    /// Entry points the route is attached to
    pub entry_points: Vec<String>,
    /// Routing rules
    pub routes: Vec<TraefikRoute>,
    /// TLS termination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

/// Traefik IngressRouteTCP
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteTcp {
    /// API version (traefik.containo.us/v1alpha1)
    #[serde(default = "IngressRouteTcp::default_api_version")]
    pub api_version: String,
    /// Resource kind (IngressRouteTCP)
    #[serde(default = "IngressRouteTcp::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Route specification
    pub spec: L4RouteSpec,
}

impl HasApiResource for IngressRouteTcp {
    const API_VERSION: &'static str = "traefik.containo.us/v1alpha1";
    const KIND: &'static str = "IngressRouteTCP";
}

impl_api_defaults!(IngressRouteTcp);

/// Traefik IngressRouteUDP
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteUdp {
    /// API version (traefik.containo.us/v1alpha1)
    #[serde(default = "IngressRouteUdp::default_api_version")]
    pub api_version: String,
    /// Resource kind (IngressRouteUDP)
    #[serde(default = "IngressRouteUdp::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Route specification
    pub spec: L4RouteSpec,
}

impl HasApiResource for IngressRouteUdp {
    const API_VERSION: &'static str = "traefik.containo.us/v1alpha1";
    const KIND: &'static str = "IngressRouteUDP";
}

impl_api_defaults!(IngressRouteUdp);

/// Spec shared by TCP and UDP routes
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct L4RouteSpec {
    /// Entry points the route is attached to
    pub entry_points: Vec<String>,
    /// Routing rules
    pub routes: Vec<TraefikRoute>,
}

/// A single Traefik routing rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraefikRoute {
    /// Match expression (e.g., ``Host(`a.example.com`)``)
    #[serde(rename = "match")]
    pub match_expr: String,
    /// Rule kind (Rule)
    pub kind: String,
    /// Backend services
    pub services: Vec<RouteService>,
}

/// Backend service reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteService {
    /// Service name
    pub name: String,
    /// Service port
    pub port: u16,
}

/// TLS block of an IngressRoute
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    /// Secret holding the certificate
    pub secret_name: String,
}

// =============================================================================
// Routing Intent
// =============================================================================

/// Route protocol as written in settings files
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP with TLS
    Http,
    /// Raw TCP
    Tcp,
    /// Raw UDP
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// The service a route sends traffic to
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceTarget {
    /// Service name; usually the Service declaration's output
    pub service_name: Deferred<String>,
    /// Service port
    pub port: u16,
}

impl ServiceTarget {
    /// Create a target
    pub fn new(service_name: impl Into<Deferred<String>>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            port,
        }
    }
}

/// What to route, by protocol
#[derive(Clone, Debug, PartialEq)]
pub enum RoutingIntent {
    /// HTTP route with TLS; skipped when there is no domain
    Http {
        /// Backend
        target: ServiceTarget,
        /// Public hostname
        domain: Option<String>,
    },
    /// TCP route on the given entry points
    Tcp {
        /// Backend
        target: ServiceTarget,
        /// Traefik entry points
        entry_points: Vec<String>,
    },
    /// UDP route on the given entry points
    Udp {
        /// Backend
        target: ServiceTarget,
        /// Traefik entry points
        entry_points: Vec<String>,
    },
}

/// Flat routing settings, as read from a config value
///
/// ```yaml
/// protocol: tcp
/// serviceName: plex
/// servicePort: 32400
/// entryPoints: [plex]
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSpec {
    /// Route protocol
    pub protocol: Protocol,
    /// Backend service name
    pub service_name: String,
    /// Backend service port
    pub service_port: u16,
    /// Hostname (HTTP only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Entry points (TCP/UDP only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<String>>,
    /// Set to false to declare nothing
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RoutingIntent {
    /// Convert flat settings, enforcing that the protocol picks exactly one
    /// of domain or entry points
    pub fn from_spec(unit: &str, spec: &RoutingSpec) -> Result<Self> {
        let target = ServiceTarget::new(spec.service_name.as_str(), spec.service_port);
        match spec.protocol {
            Protocol::Http => {
                if spec.entry_points.is_some() {
                    return Err(Error::validation_for_field(
                        unit,
                        "entryPoints",
                        "http routes always use the web entry points",
                    ));
                }
                Ok(RoutingIntent::Http {
                    target,
                    domain: spec.domain.clone(),
                })
            }
            Protocol::Tcp | Protocol::Udp => {
                if spec.domain.is_some() {
                    return Err(Error::validation_for_field(
                        unit,
                        "domain",
                        format!("{} routes match any host; domain is not allowed", spec.protocol.as_str()),
                    ));
                }
                let entry_points = spec.entry_points.clone().ok_or_else(|| {
                    Error::validation_for_field(
                        unit,
                        "entryPoints",
                        format!("required for {} routes", spec.protocol.as_str()),
                    )
                })?;
                if spec.protocol == Protocol::Tcp {
                    Ok(RoutingIntent::Tcp { target, entry_points })
                } else {
                    Ok(RoutingIntent::Udp { target, entry_points })
                }
            }
        }
    }

    /// Protocol of this intent
    pub fn protocol(&self) -> Protocol {
        match self {
            RoutingIntent::Http { .. } => Protocol::Http,
            RoutingIntent::Tcp { .. } => Protocol::Tcp,
            RoutingIntent::Udp { .. } => Protocol::Udp,
        }
    }

    /// Backend of this intent
    pub fn target(&self) -> &ServiceTarget {
        match self {
            RoutingIntent::Http { target, .. }
            | RoutingIntent::Tcp { target, .. }
            | RoutingIntent::Udp { target, .. } => target,
        }
    }

    /// Replace the backend service name, e.g. with a Service declaration's output
    pub fn with_service(mut self, service_name: Deferred<String>) -> Self {
        match &mut self {
            RoutingIntent::Http { target, .. }
            | RoutingIntent::Tcp { target, .. }
            | RoutingIntent::Udp { target, .. } => target.service_name = service_name,
        }
        self
    }

    fn validate(&self, unit: &str) -> Result<()> {
        if self.target().port == 0 {
            return Err(Error::validation_for_field(unit, "servicePort", "port must be non-zero"));
        }
        match self {
            RoutingIntent::Http { domain, .. } => {
                if let Some(domain) = IngressCompiler::usable_domain(domain) {
                    check_domain(unit, domain)?;
                }
                Ok(())
            }
            RoutingIntent::Tcp { entry_points, .. } | RoutingIntent::Udp { entry_points, .. } => {
                if entry_points.is_empty() || entry_points.iter().any(|e| e.trim().is_empty()) {
                    return Err(Error::validation_for_field(
                        unit,
                        "entryPoints",
                        format!("{} routes need at least one entry point", self.protocol().as_str()),
                    ));
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Generated Resources
// =============================================================================

/// Certificate an HTTP route needs
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCertificate {
    /// Logical name of the certificate component
    pub name: String,
    /// Domain to issue for
    pub domain: String,
}

/// A compiled route of one of the three kinds
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratedRoute {
    /// HTTP route
    Http(IngressRoute),
    /// TCP route
    Tcp(IngressRouteTcp),
    /// UDP route
    Udp(IngressRouteUdp),
}

impl GeneratedRoute {
    /// Resource kind
    pub fn kind(&self) -> &str {
        match self {
            GeneratedRoute::Http(r) => &r.kind,
            GeneratedRoute::Tcp(r) => &r.kind,
            GeneratedRoute::Udp(r) => &r.kind,
        }
    }

    /// metadata.name
    pub fn name(&self) -> &str {
        match self {
            GeneratedRoute::Http(r) => &r.metadata.name,
            GeneratedRoute::Tcp(r) => &r.metadata.name,
            GeneratedRoute::Udp(r) => &r.metadata.name,
        }
    }

    /// Logical name the route is declared under (`<metadata.name>-ingress-route`)
    pub fn logical_name(&self) -> String {
        format!("{}-ingress-route", self.name())
    }

    fn declare(&self, stack: &mut Stack, opts: homelab_common::ResourceOptions) -> Result<()> {
        let name = self.logical_name();
        match self {
            GeneratedRoute::Http(r) => stack.declare_object(&name, r, opts)?,
            GeneratedRoute::Tcp(r) => stack.declare_object(&name, r, opts)?,
            GeneratedRoute::Udp(r) => stack.declare_object(&name, r, opts)?,
        };
        Ok(())
    }
}

/// Generated ingress resources
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedIngress {
    /// Certificate to compose before the route
    pub certificate: Option<PlannedCertificate>,
    /// The route itself
    pub route: Option<GeneratedRoute>,
}

impl GeneratedIngress {
    /// Create empty generated ingress
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.route.is_none()
    }

    /// Total resource count
    pub fn total_count(&self) -> usize {
        [self.certificate.is_some(), self.route.is_some()]
            .iter()
            .filter(|&&x| x)
            .count()
    }
}

// =============================================================================
// Ingress Compiler
// =============================================================================

/// Compiles routing intents into Traefik resources
pub struct IngressCompiler;

impl IngressCompiler {
    /// Compile everything an intent declares.
    ///
    /// The HTTP route's TLS secret is the certificate's derived secret name.
    pub fn compile(
        name: &str,
        namespace: &str,
        service_name: &str,
        intent: &RoutingIntent,
    ) -> GeneratedIngress {
        let certificate = Self::compile_certificate(name, intent);
        let tls_secret = certificate.as_ref().map(|c| secret_name_for(&c.name));
        let route = Self::compile_route(name, namespace, service_name, intent, tls_secret.as_deref());
        GeneratedIngress { certificate, route }
    }

    /// The certificate an intent needs, if any
    pub fn compile_certificate(name: &str, intent: &RoutingIntent) -> Option<PlannedCertificate> {
        match intent {
            RoutingIntent::Http { domain, .. } => Self::usable_domain(domain).map(|d| PlannedCertificate {
                name: name.to_string(),
                domain: d.to_string(),
            }),
            RoutingIntent::Tcp { .. } | RoutingIntent::Udp { .. } => None,
        }
    }

    /// The route an intent declares, if any
    pub fn compile_route(
        name: &str,
        namespace: &str,
        service_name: &str,
        intent: &RoutingIntent,
        tls_secret: Option<&str>,
    ) -> Option<GeneratedRoute> {
        let port = intent.target().port;
        match intent {
            RoutingIntent::Http { domain, .. } => {
                let domain = Self::usable_domain(domain)?;
                Some(GeneratedRoute::Http(Self::compile_http(
                    name,
                    namespace,
                    service_name,
                    port,
                    domain,
                    tls_secret,
                )))
            }
            RoutingIntent::Tcp { entry_points, .. } => {
                Some(GeneratedRoute::Tcp(Self::compile_tcp(
                    name,
                    namespace,
                    service_name,
                    port,
                    entry_points,
                )))
            }
            RoutingIntent::Udp { entry_points, .. } => {
                Some(GeneratedRoute::Udp(Self::compile_udp(
                    name,
                    namespace,
                    service_name,
                    port,
                    entry_points,
                )))
            }
        }
    }

    fn usable_domain(domain: &Option<String>) -> Option<&str> {
        domain.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    fn rule(match_expr: String, service_name: &str, port: u16) -> TraefikRoute {
        TraefikRoute {
            match_expr,
            kind: ROUTE_KIND_RULE.to_string(),
            services: vec![RouteService {
                name: service_name.to_string(),
                port,
            }],
        }
    }

    fn compile_http(
        name: &str,
        namespace: &str,
        service_name: &str,
        port: u16,
        domain: &str,
        tls_secret: Option<&str>,
    ) -> IngressRoute {
        IngressRoute::new(
            ObjectMeta::new(format!("{}-http", name), namespace),
            IngressRouteSpec {
                entry_points: HTTP_ENTRY_POINTS.iter().map(|e| e.to_string()).collect(),
                routes: vec![Self::rule(format!("Host(`{}`)", domain), service_name, port)],
                tls: tls_secret.map(|s| RouteTls {
                    secret_name: s.to_string(),
                }),
            },
        )
    }

    fn compile_tcp(
        name: &str,
        namespace: &str,
        service_name: &str,
        port: u16,
        entry_points: &[String],
    ) -> IngressRouteTcp {
        IngressRouteTcp {
            api_version: IngressRouteTcp::default_api_version(),
            kind: IngressRouteTcp::default_kind(),
            metadata: ObjectMeta::new(format!("{}-tcp", name), namespace),
            spec: Self::l4_spec(service_name, port, entry_points),
        }
    }

    fn compile_udp(
        name: &str,
        namespace: &str,
        service_name: &str,
        port: u16,
        entry_points: &[String],
    ) -> IngressRouteUdp {
        IngressRouteUdp {
            api_version: IngressRouteUdp::default_api_version(),
            kind: IngressRouteUdp::default_kind(),
            metadata: ObjectMeta::new(format!("{}-udp", name), namespace),
            spec: Self::l4_spec(service_name, port, entry_points),
        }
    }

    fn l4_spec(service_name: &str, port: u16, entry_points: &[String]) -> L4RouteSpec {
        L4RouteSpec {
            entry_points: entry_points.to_vec(),
            routes: vec![Self::rule(MATCH_ANY_SNI.to_string(), service_name, port)],
        }
    }
}

// =============================================================================
// Component
// =============================================================================

/// Arguments for [`Ingress`]
#[derive(Clone, Debug)]
pub struct IngressArgs {
    /// What to route
    pub intent: RoutingIntent,
    /// Namespace the routes live in
    pub scope: ScopeHandle,
    /// When false nothing is declared
    pub enabled: bool,
}

impl IngressArgs {
    /// Enabled ingress for an intent
    pub fn new(intent: RoutingIntent, scope: ScopeHandle) -> Self {
        Self {
            intent,
            scope,
            enabled: true,
        }
    }

    /// Build arguments from flat settings
    pub fn from_spec(unit: &str, spec: &RoutingSpec, scope: ScopeHandle) -> Result<Self> {
        Ok(Self {
            intent: RoutingIntent::from_spec(unit, spec)?,
            scope,
            enabled: spec.enabled,
        })
    }
}

/// Protocol-polymorphic ingress: one route, plus a certificate for HTTP
pub struct Ingress;

impl Component for Ingress {
    const TYPE: &'static str = "homelab:resources:Ingress";
    type Args = IngressArgs;
    type Output = ();

    fn compose(stack: &mut Stack, unit: &ComponentUnit, args: IngressArgs) -> Result<()> {
        let name = unit.name();
        let protocol = args.intent.protocol().as_str();

        if !args.enabled {
            debug!(ingress = %name, protocol, "ingress disabled, declaring nothing");
            return Ok(());
        }
        args.intent.validate(name)?;

        let mut route_opts = unit.child_opts();
        let namespace = args.scope.namespace().read(&mut route_opts).clone();
        let service_name = args.intent.target().service_name.read(&mut route_opts).clone();
        if service_name.trim().is_empty() {
            return Err(Error::validation_for_field(name, "serviceName", "service name must not be empty"));
        }

        let mut tls_secret = None;
        if let Some(planned) = IngressCompiler::compile_certificate(name, &args.intent) {
            let handle = stack.component::<ManagedCertificate>(
                &planned.name,
                CertificateArgs {
                    domain: planned.domain,
                    scope: args.scope.clone(),
                    issuer: None,
                },
                unit.child_opts(),
            )?;
            tls_secret = Some(handle.secret_name().read(&mut route_opts).clone());
            route_opts = route_opts.depends_on(handle.request());
        }

        let Some(route) = IngressCompiler::compile_route(
            name,
            &namespace,
            &service_name,
            &args.intent,
            tls_secret.as_deref(),
        ) else {
            warn!(ingress = %name, protocol, "http ingress has no domain, skipping");
            return Ok(());
        };

        route.declare(stack, route_opts)?;
        debug!(
            ingress = %name,
            protocol,
            route = %route.name(),
            service = %service_name,
            "declared ingress route"
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::declare_namespace;
    use homelab_common::{ResourceOptions, Urn};
    use proptest::prelude::*;

    fn http(domain: Option<&str>) -> RoutingIntent {
        RoutingIntent::Http {
            target: ServiceTarget::new("overseerr-svc", 80),
            domain: domain.map(String::from),
        }
    }

    fn tcp(entry_points: Vec<&str>) -> RoutingIntent {
        RoutingIntent::Tcp {
            target: ServiceTarget::new("plex", 32400),
            entry_points: entry_points.into_iter().map(String::from).collect(),
        }
    }

    fn udp(entry_points: Vec<&str>) -> RoutingIntent {
        RoutingIntent::Udp {
            target: ServiceTarget::new("unifi", 3478),
            entry_points: entry_points.into_iter().map(String::from).collect(),
        }
    }

    fn compose(name: &str, intent: RoutingIntent) -> (Stack, Result<()>) {
        let mut stack = Stack::new("home", "dev");
        let scope = declare_namespace(&mut stack, "media", ResourceOptions::new()).unwrap();
        let result =
            stack.component::<Ingress>(name, IngressArgs::new(intent, scope), ResourceOptions::new());
        (stack, result)
    }

    // =========================================================================
    // Compiler
    // =========================================================================

    #[test]
    fn compiles_http_route_with_tls() {
        let output = IngressCompiler::compile("overseerr", "media", "overseerr-svc", &http(Some("overseerr.example.com")));

        assert_eq!(output.total_count(), 2);
        let cert = output.certificate.expect("should plan certificate");
        assert_eq!(cert.name, "overseerr");
        assert_eq!(cert.domain, "overseerr.example.com");

        let Some(GeneratedRoute::Http(route)) = output.route else {
            panic!("expected http route");
        };
        assert_eq!(route.kind, "IngressRoute");
        assert_eq!(route.metadata.name, "overseerr-http");
        assert_eq!(route.metadata.namespace, "media");
        assert_eq!(route.spec.entry_points, vec!["web", "web-secure"]);
        assert_eq!(route.spec.routes[0].match_expr, "Host(`overseerr.example.com`)");
        assert_eq!(route.spec.routes[0].kind, "Rule");
        assert_eq!(route.spec.routes[0].services[0].name, "overseerr-svc");
        assert_eq!(route.spec.routes[0].services[0].port, 80);
        assert_eq!(route.spec.tls.unwrap().secret_name, "overseerr-certificate");
    }

    #[test]
    fn compiles_nothing_for_http_without_domain() {
        assert!(IngressCompiler::compile("a", "media", "svc", &http(None)).is_empty());
        assert!(IngressCompiler::compile("a", "media", "svc", &http(Some(""))).is_empty());
    }

    #[test]
    fn compiles_tcp_route() {
        let output = IngressCompiler::compile("plex", "media", "plex", &tcp(vec!["plex"]));
        assert!(output.certificate.is_none());

        let Some(GeneratedRoute::Tcp(route)) = output.route else {
            panic!("expected tcp route");
        };
        assert_eq!(route.kind, "IngressRouteTCP");
        assert_eq!(route.metadata.name, "plex-tcp");
        assert_eq!(route.spec.entry_points, vec!["plex"]);
        assert_eq!(route.spec.routes[0].match_expr, "HostSNI(`*`)");
    }

    #[test]
    fn compiles_udp_route() {
        let output = IngressCompiler::compile("unifi", "network", "unifi", &udp(vec!["stun"]));
        let route = output.route.expect("should have route");
        assert_eq!(route.kind(), "IngressRouteUDP");
        assert_eq!(route.name(), "unifi-udp");
        assert_eq!(route.logical_name(), "unifi-udp-ingress-route");
    }

    #[test]
    fn route_serializes_match_key() {
        let output = IngressCompiler::compile("a", "media", "svc", &tcp(vec!["a"]));
        let Some(GeneratedRoute::Tcp(route)) = output.route else {
            panic!("expected tcp route");
        };
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["apiVersion"], "traefik.containo.us/v1alpha1");
        assert_eq!(value["spec"]["entryPoints"][0], "a");
        assert_eq!(value["spec"]["routes"][0]["match"], "HostSNI(`*`)");
    }

    // =========================================================================
    // Routing spec conversion
    // =========================================================================

    fn spec(protocol: Protocol) -> RoutingSpec {
        RoutingSpec {
            protocol,
            service_name: "svc".to_string(),
            service_port: 8080,
            domain: None,
            entry_points: None,
            enabled: true,
        }
    }

    #[test]
    fn spec_deserializes_with_enabled_default() {
        let value = serde_json::json!({
            "protocol": "tcp",
            "serviceName": "plex",
            "servicePort": 32400,
            "entryPoints": ["plex"]
        });
        let spec: RoutingSpec = serde_json::from_value(value).unwrap();
        assert!(spec.enabled);
        let intent = RoutingIntent::from_spec("plex", &spec).unwrap();
        assert_eq!(intent.protocol(), Protocol::Tcp);
        assert_eq!(intent.target().port, 32400);
    }

    #[test]
    fn spec_rejects_domain_on_tcp() {
        let mut s = spec(Protocol::Tcp);
        s.domain = Some("a.example.com".to_string());
        s.entry_points = Some(vec!["a".to_string()]);
        let err = RoutingIntent::from_spec("a", &s).unwrap_err();
        assert_eq!(err.field(), Some("domain"));
    }

    #[test]
    fn spec_requires_entry_points_for_udp() {
        let err = RoutingIntent::from_spec("a", &spec(Protocol::Udp)).unwrap_err();
        assert_eq!(err.field(), Some("entryPoints"));
        assert_eq!(err.unit(), Some("a"));
    }

    #[test]
    fn spec_rejects_entry_points_on_http() {
        let mut s = spec(Protocol::Http);
        s.entry_points = Some(vec!["web".to_string()]);
        assert!(RoutingIntent::from_spec("a", &s).is_err());
    }

    #[test]
    fn with_service_replaces_target() {
        let urn = Urn::root("dev", "home", "kubernetes:core/v1:Service", "svc");
        let intent = http(Some("a.example.com"))
            .with_service(Deferred::produced_by(&urn, "overseerr".to_string()));
        let mut opts = ResourceOptions::new();
        assert_eq!(intent.target().service_name.read(&mut opts), "overseerr");
        assert!(opts.implicit_edges().contains(&urn));
    }

    // =========================================================================
    // Component
    // =========================================================================

    #[test]
    fn http_ingress_declares_certificate_then_route() {
        let (stack, result) = compose("overseerr", http(Some("overseerr.example.com")));
        result.unwrap();

        assert_eq!(stack.resources_of_kind("Certificate").count(), 1);
        let routes: Vec<_> = stack.resources_of_kind("IngressRoute").collect();
        assert_eq!(routes.len(), 1);

        let cert = stack.resources_of_kind("Certificate").next().unwrap();
        assert!(routes[0].depends_on.contains(&cert.urn));
        assert!(routes[0].reads.contains(&cert.urn));

        let sequence = stack.sequence().unwrap();
        assert!(sequence.position(&cert.urn) < sequence.position(&routes[0].urn));
    }

    #[test]
    fn http_ingress_without_domain_declares_nothing() {
        let (stack, result) = compose("overseerr", http(None));
        result.unwrap();
        // Only the namespace
        assert_eq!(stack.resource_count(), 1);
    }

    #[test]
    fn disabled_ingress_declares_nothing() {
        let mut stack = Stack::new("home", "dev");
        let scope = declare_namespace(&mut stack, "media", ResourceOptions::new()).unwrap();
        let mut args = IngressArgs::new(tcp(vec!["plex"]), scope);
        args.enabled = false;
        stack
            .component::<Ingress>("plex", args, ResourceOptions::new())
            .unwrap();
        assert_eq!(stack.resource_count(), 1);
    }

    #[test]
    fn tcp_ingress_with_empty_entry_points_fails() {
        let (stack, result) = compose("plex", tcp(vec![]));
        let err = result.unwrap_err();
        assert_eq!(err.field(), Some("entryPoints"));
        assert_eq!(stack.resources_of_kind("IngressRouteTCP").count(), 0);
    }

    #[test]
    fn blank_service_name_fails() {
        for service in ["", "  "] {
            let intent = RoutingIntent::Tcp {
                target: ServiceTarget::new(service, 32400),
                entry_points: vec!["plex".to_string()],
            };
            let (stack, result) = compose("plex", intent);
            assert_eq!(result.unwrap_err().field(), Some("serviceName"));
            assert_eq!(stack.resource_count(), 1);
            assert_eq!(stack.graph().len(), 1);
        }
    }

    #[test]
    fn http_ingress_with_blank_service_declares_no_certificate() {
        let intent = RoutingIntent::Http {
            target: ServiceTarget::new("", 80),
            domain: Some("overseerr.example.com".to_string()),
        };
        let (stack, result) = compose("overseerr", intent);
        assert_eq!(result.unwrap_err().field(), Some("serviceName"));
        assert_eq!(stack.resources_of_kind("Certificate").count(), 0);
    }

    #[test]
    fn failed_ingress_can_be_retried_under_same_name() {
        let mut stack = Stack::new("home", "dev");
        let scope = declare_namespace(&mut stack, "media", ResourceOptions::new()).unwrap();

        let err = stack
            .component::<Ingress>("plex", IngressArgs::new(tcp(vec![]), scope.clone()), ResourceOptions::new())
            .unwrap_err();
        assert_eq!(err.field(), Some("entryPoints"));
        assert_eq!(stack.graph().len(), 1);

        stack
            .component::<Ingress>("plex", IngressArgs::new(tcp(vec!["plex"]), scope), ResourceOptions::new())
            .unwrap();
        let unit = Urn::root("dev", "home", Ingress::TYPE, "plex");
        assert!(stack.get(&unit).is_some());
        assert_eq!(stack.resources_of_kind("IngressRouteTCP").count(), 1);
    }

    #[test]
    fn http_domain_is_trimmed() {
        let (stack, result) = compose("overseerr", http(Some("  overseerr.example.com ")));
        result.unwrap();

        let cert = &stack.resources_of_kind("Certificate").next().unwrap().body().unwrap().value;
        assert_eq!(cert["spec"]["dnsNames"][0], "overseerr.example.com");
        let route = &stack.resources_of_kind("IngressRoute").next().unwrap().body().unwrap().value;
        assert_eq!(route["spec"]["routes"][0]["match"], "Host(`overseerr.example.com`)");
    }

    #[test]
    fn malformed_http_domain_fails() {
        for domain in ["over`seerr.example.com", "overseerr.example.com`) || Host(`x", "over seerr.example.com"] {
            let (stack, result) = compose("overseerr", http(Some(domain)));
            assert_eq!(result.unwrap_err().field(), Some("domain"), "{:?}", domain);
            assert_eq!(stack.resource_count(), 1);
        }
    }

    #[test]
    fn zero_port_fails() {
        let intent = RoutingIntent::Tcp {
            target: ServiceTarget::new("plex", 0),
            entry_points: vec!["plex".to_string()],
        };
        let (_, result) = compose("plex", intent);
        assert_eq!(result.unwrap_err().field(), Some("servicePort"));
    }

    #[test]
    fn route_is_owned_by_ingress_unit() {
        let (stack, result) = compose("plex", tcp(vec!["plex"]));
        result.unwrap();
        let unit = Urn::root("dev", "home", Ingress::TYPE, "plex");
        let owned: Vec<&str> = stack.owned_by(&unit).iter().map(|n| n.name()).collect();
        assert_eq!(owned, vec!["plex-tcp-ingress-route"]);
    }

    proptest! {
        /// Any HTTP intent with a domain yields one certificate and one route
        /// whose TLS secret is the certificate's.
        #[test]
        fn http_with_domain_yields_certificate_and_route(
            name in "[a-z][a-z0-9-]{0,20}",
            domain in "[a-z]{1,10}\\.example\\.com",
        ) {
            let (stack, result) = compose(&name, http(Some(&domain)));
            prop_assert!(result.is_ok());

            let certs: Vec<_> = stack.resources_of_kind("Certificate").collect();
            let routes: Vec<_> = stack.resources_of_kind("IngressRoute").collect();
            prop_assert_eq!(certs.len(), 1);
            prop_assert_eq!(routes.len(), 1);

            let secret = format!("{}-certificate", name);
            let route = routes[0].body().unwrap();
            prop_assert_eq!(route.value["spec"]["tls"]["secretName"].as_str(), Some(secret.as_str()));
            prop_assert!(routes[0].depends_on.contains(&certs[0].urn));
        }

        /// Any L4 intent yields one route of its kind with a wildcard match
        /// and no certificate.
        #[test]
        fn l4_yields_single_wildcard_route(
            name in "[a-z][a-z0-9-]{0,20}",
            entry_points in proptest::collection::vec("[a-z]{1,8}", 1..4),
            use_udp in any::<bool>(),
        ) {
            let target = ServiceTarget::new("svc", 9000);
            let (intent, kind) = if use_udp {
                (RoutingIntent::Udp { target, entry_points: entry_points.clone() }, "IngressRouteUDP")
            } else {
                (RoutingIntent::Tcp { target, entry_points: entry_points.clone() }, "IngressRouteTCP")
            };

            let (stack, result) = compose(&name, intent);
            prop_assert!(result.is_ok());
            prop_assert_eq!(stack.resources_of_kind("Certificate").count(), 0);

            let routes: Vec<_> = stack.resources_of_kind(kind).collect();
            prop_assert_eq!(routes.len(), 1);
            let body = routes[0].body().unwrap();
            prop_assert_eq!(body.value["spec"]["routes"][0]["match"].as_str(), Some(MATCH_ANY_SNI));
            prop_assert_eq!(body.value["spec"]["entryPoints"].as_array().map(|a| a.len()), Some(entry_points.len()));
        }
    }
}
