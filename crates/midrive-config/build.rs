//! Build script for midrive-config
//!
//! Embeds the default config template at compile time using CARGO_MANIFEST_DIR,
//! so the template is tracked for rebuilds and a missing file fails the build
//! with a clear message.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let workspace_root = PathBuf::from(&manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .expect("Could not find workspace root")
        .to_path_buf();

    let config_path = workspace_root.join("midrive.toml");

    let default_config = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read default config at {}: {}",
            config_path.display(),
            e
        )
    });

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let generated = format!(
        "/// Default configuration template (midrive.toml)\npub const DEFAULT_CONFIG: &str = {:?};\n",
        default_config
    );
    fs::write(out_dir.join("embedded_configs.rs"), generated)
        .expect("Failed to write embedded_configs.rs");

    println!("cargo:rerun-if-changed={}", config_path.display());
}
