/// Link the kernel image at its high-half virtual address.
const LINKER_SCRIPT: &str = "src/linker.ld";

fn main() {
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:rerun-if-changed={}", LINKER_SCRIPT);
    if arch == "aarch64" && os == "none" {
        println!("cargo:rustc-link-arg=--script={}", LINKER_SCRIPT);
    }
}
