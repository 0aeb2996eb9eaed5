fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let version_script = format!("{manifest_dir}/version_scripts/libc.map");
    println!("cargo:rerun-if-changed=version_scripts/libc.map");

    // The script names every entry point, so it only applies when all of
    // them are exported: release builds with the variadic families.
    let release = std::env::var("PROFILE").is_ok_and(|p| p == "release");
    let variadic = std::env::var_os("CARGO_FEATURE_C_VARIADIC").is_some();
    if release && variadic && std::path::Path::new(&version_script).exists() {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={version_script}");
    }
}
