use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let package_name = env::var("CARGO_PKG_NAME").unwrap();

    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
    println!("cargo:rerun-if-env-changed=W3W_HEADER_DIR");

    // Hosts point W3W_HEADER_DIR at their include directory; default is OUT_DIR
    let include_dir = env::var("W3W_HEADER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env::var("OUT_DIR").unwrap()));
    let output_file = include_dir.join(format!("{}.h", package_name));

    let config = cbindgen::Config::from_file(PathBuf::from(&crate_dir).join("cbindgen.toml"))
        .unwrap_or_default();

    // header generation never fails the build
    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            if let Err(e) = std::fs::create_dir_all(&include_dir) {
                println!("cargo:warning=Failed to create include directory: {e}");
                return;
            }
            bindings.write_to_file(&output_file);
        }
        Err(e) => println!("cargo:warning=C header generation skipped: {e}"),
    }
}
