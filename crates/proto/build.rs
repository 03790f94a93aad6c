fn main() {
    println!("cargo:rerun-if-changed=proto/manager.proto");

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/manager.proto"], &["proto"])
        .expect("failed to compile gRPC definitions");
}
