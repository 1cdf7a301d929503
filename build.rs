//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into `OUT_DIR`; the generated module is
//! pulled in by `src/generated.rs`. A vendored `protoc` is used unless the
//! `PROTOC` environment variable already points at one.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        std::env::set_var("PROTOC", protoc);
    }

    tonic_prost_build::configure()
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
