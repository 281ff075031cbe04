fn main() {
    let proto_path = "proto/simlink.proto";
    println!("cargo:rerun-if-changed={proto_path}");
    println!("cargo:rerun-if-changed=proto");

    let protoc_path =
        protoc_bin_vendored::protoc_bin_path().expect("failed to locate vendored protoc binary");
    std::env::set_var("PROTOC", protoc_path);
    let well_known =
        protoc_bin_vendored::include_path().expect("failed to locate vendored protoc includes");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&[proto_path], &[std::path::Path::new("proto"), well_known.as_path()])
        .expect("failed to compile simlink proto");
}
