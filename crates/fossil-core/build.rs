//! Build script for fossil-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (clap 4.5 and `div_ceil` need Rust 1.74.0+)
//! - Pointer width (core files are decoded as 64-bit images)
//!
//! ## Requirements
//!
//! - **Rust**: 1.74.0 or newer
//! - **Targets**: any 64-bit host; the dumps themselves must be ELF64 Linux cores

fn main()
{
    // Check minimum Rust version
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 74, 0);

        if rustc_version < min_rust_version {
            panic!(
                "fossil-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    check_pointer_width();
}

fn check_pointer_width()
{
    // Addresses are u64 everywhere, but slices into dump buffers are indexed
    // with usize; a 32-bit host cannot address large cores.
    let width = std::env::var("CARGO_CFG_TARGET_POINTER_WIDTH").unwrap_or_default();
    if width != "64" {
        println!("cargo:warning=fossil-core on a {width}-bit host cannot map dumps larger than 4 GiB");
    }
}
