fn main() {
    // Rebuild if fluid shaders change
    println!("cargo:rerun-if-changed=shaders/fluid/integrate.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/grid.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/scan.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/reindex.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/solver.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/viscosity.wgsl");
    println!("cargo:rerun-if-changed=shaders/fluid/particles.wgsl");
}
