//! Generated bindings for the two envoy RPC contracts this system serves:
//! ext_authz (`Authorization.Check`) and ext_proc (`ExternalProcessor.Process`).

#[allow(warnings)]
#[allow(clippy::derive_partial_eq_without_eq)]
pub mod ext_authz {
	tonic::include_proto!("envoy.service.auth.v3");
}

#[allow(warnings)]
#[allow(clippy::derive_partial_eq_without_eq)]
pub mod ext_proc {
	tonic::include_proto!("envoy.service.ext_proc.v3");
}
