use std::env;

fn main() {
    if let Some(dir) = env::var_os("OCI_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
    let oracle_client_lib = if cfg!(windows) { "oci" } else { "clntsh" };
    println!("cargo:rustc-link-lib=dylib={}", oracle_client_lib);
}
