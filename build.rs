fn main() {
    println!("cargo:rerun-if-changed=ffi");
    println!("cargo:rerun-if-env-changed=EI_SDK_DIR");

    if std::env::var("CARGO_FEATURE_EDGE_IMPULSE").is_ok() {
        let sdk_root = std::env::var("EI_SDK_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("model-inferencing"));
        build_ei(&sdk_root);
    }
}

fn build_ei(sdk_root: &std::path::Path) {
    let mut build = cc::Build::new();

    build
        .cpp(true)
        .flag_if_supported("-std=c++14")
        .flag_if_supported("-O3")
        .define("EI_CLASSIFIER_ENABLE_DETECTION_3D", "0")
        .define("EI_CLASSIFIER_TFLITE_ENABLE_CMSIS_NN", "0")
        .define("EI_NATIVE_ARCH", "1")
        .include("ffi")
        .include(sdk_root)
        .include(sdk_root.join("edge-impulse-sdk"))
        .include(sdk_root.join("model-parameters"))
        .include(sdk_root.join("tflite-model"))
        .file("ffi/ei_shim.cpp");

    // The SDK ships its own sources; compile every C/C++ file under it.
    add_source_files(&mut build, sdk_root);

    build.compile("edge-impulse-sdk");

    println!("cargo:rerun-if-changed={}", sdk_root.display());
}

fn add_source_files(build: &mut cc::Build, dir: &std::path::Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => panic!("cannot read Edge Impulse SDK dir {}: {e}", dir.display()),
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            // Only the posix port builds on a host; SDK self-tests never do.
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let in_porting = dir.file_name().and_then(|n| n.to_str()) == Some("porting");
            let skip = matches!(name, "tests" | "examples") || (in_porting && name != "posix");
            if !skip {
                add_source_files(build, &path);
            }
        } else if let Some(ext) = path.extension() {
            if ext == "c" || ext == "cpp" || ext == "cc" {
                build.file(&path);
            }
        }
    }
}
