// ABOUTME: Build script for generating Rust code from mesh.proto.
// ABOUTME: Uses tonic-build with a vendored protoc so no system install is required.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    let well_known = protoc_bin_vendored::include_path()?;
    std::env::set_var("PROTOC", protoc);

    // The DispatchService `Connect` rpc would collide with the transport
    // `connect` constructor, so clients are always built from a channel.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .build_transport(false)
        .compile_protos(
            &["proto-src/mesh.proto"],
            &[std::path::PathBuf::from("proto-src"), well_known],
        )?;

    println!("cargo:rerun-if-changed=proto-src/mesh.proto");

    Ok(())
}
