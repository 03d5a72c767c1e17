use std::path::{Path, PathBuf};

/// First of `candidates` under `root` that exists, else the first candidate.
fn lib_dir(root: &Path, candidates: &[&str]) -> PathBuf {
    candidates
        .iter()
        .map(|c| root.join(c))
        .find(|p| p.exists())
        .unwrap_or_else(|| root.join(candidates[0]))
}

fn main() {
    println!("cargo:rerun-if-env-changed=CUDA_ROOT");
    println!("cargo:rerun-if-env-changed=TENSORRT_ROOT");

    if std::env::var("CARGO_FEATURE_TRT_BACKEND").is_err() {
        return;
    }

    let cpp_root = PathBuf::from("../inference-cpp");
    let src = cpp_root.join("src/tensorrt_backend.cpp");
    let include_dir = cpp_root.join("include");

    let cuda_root =
        PathBuf::from(std::env::var("CUDA_ROOT").unwrap_or_else(|_| "/usr/local/cuda".into()));
    let trt_root = PathBuf::from(
        std::env::var("TENSORRT_ROOT").unwrap_or_else(|_| "/usr/local/tensorrt".into()),
    );

    let cuda_lib = lib_dir(&cuda_root, &["lib64", "lib/x86_64-linux-gnu", "lib"]);
    let trt_lib = lib_dir(&trt_root, &["lib", "lib/x86_64-linux-gnu", "lib64"]);

    cxx_build::bridge("src/backend/trt.rs")
        .file(&src)
        .include(&include_dir)
        .include(cuda_root.join("include"))
        .include(trt_root.join("include"))
        .flag_if_supported("-std=c++17")
        .flag_if_supported("-Wno-unused-parameter")
        .compile("inference-trt");

    println!("cargo:rerun-if-changed={}", src.display());
    println!(
        "cargo:rerun-if-changed={}",
        include_dir.join("tensorrt_backend.hpp").display()
    );
    println!("cargo:rerun-if-changed=src/backend/trt.rs");

    println!("cargo:rustc-link-search=native={}", cuda_lib.display());
    println!("cargo:rustc-link-search=native={}", trt_lib.display());
    println!("cargo:rustc-link-lib=cudart");
    println!("cargo:rustc-link-lib=nvinfer");
}
