// Version metadata for `ppp version`: build timestamp plus the `built` file
// (package version, git commit, dirty flag).
fn main() {
    let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    println!("cargo:rustc-env=BUILD_DATE={}", stamp);

    built::write_built_file().expect("Failed to acquire build-time information");
}
