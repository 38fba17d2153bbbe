fn main() {
    // Keep `check-cfg` happy even when we skip `tauri_build::build()` (core-only unit tests).
    println!("cargo:rustc-check-cfg=cfg(desktop)");
    println!("cargo:rustc-check-cfg=cfg(mobile)");

    // `tauri-build` is only pulled in with the desktop runtime stack. Core-only builds
    // (`cargo test`) never compile Tauri, so the build helpers are skipped entirely.
    #[cfg(feature = "app")]
    tauri_build::build()
}
