use std::env;

// Generates the Rust bindings for the vendored ext_authz / ext_proc proto
// contracts. build_server(true) since this workspace implements the RPC
// server side of both contracts, never the client.
fn main() -> Result<(), anyhow::Error> {
	let proto_root = std::env::current_dir()?.join("../../proto");
	let proto_files = [
		"envoy/service/auth/v3/external_auth.proto",
		"envoy/service/ext_proc/v3/external_processor.proto",
	]
	.iter()
	.map(|name| proto_root.join(name))
	.collect::<Vec<_>>();
	let include_dirs = [proto_root.clone()];

	let out_dir = env::var("OUT_DIR")?;
	let descriptor_path = std::path::PathBuf::from(&out_dir).join("botlimit_descriptor.bin");

	tonic_build::configure()
		.build_server(true)
		.build_client(false)
		.file_descriptor_set_path(descriptor_path)
		.compile_well_known_types(true)
		.compile_protos(
			&proto_files
				.iter()
				.map(|p| p.to_str().unwrap())
				.collect::<Vec<_>>(),
			&include_dirs
				.iter()
				.map(|p| p.to_str().unwrap())
				.collect::<Vec<_>>(),
		)?;

	for path in proto_files.iter().chain(include_dirs.iter()) {
		println!("cargo:rerun-if-changed={}", path.to_str().unwrap());
	}

	Ok(())
}
