fn main() {
    // Rerun if migrations change
    println!("cargo:rerun-if-changed=migrations/");
}
