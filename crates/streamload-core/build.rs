/// Builds the gRPC client and server code for the `helloworld.proto`
/// definition using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`.
///
/// # Files and Paths
///
/// - Proto file: `proto/helloworld.proto`
/// - Includes: `proto/`
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("helloworld");
/// }
/// ```
///
/// Both the client (used by the load generator) and the server trait (used by
/// test fixtures) are generated.
fn main() {
    println!("cargo:rerun-if-changed=proto/helloworld.proto");

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/helloworld.proto"], &["proto"])
        .unwrap();
}
