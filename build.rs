use rustc_version::{version_meta, Channel};

// lib.rs turns on `doc_auto_cfg` only when docs are built on nightly (which
// is what docs.rs runs), so the compiler channel has to be surfaced as a cfg
// flag here.
fn main() {
    println!("cargo::rustc-check-cfg=cfg(CHANNEL_NIGHTLY, values(none()))");
    if matches!(version_meta().unwrap().channel, Channel::Nightly) {
        println!("cargo:rustc-cfg=CHANNEL_NIGHTLY");
    }
}
