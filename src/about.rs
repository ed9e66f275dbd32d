pub const CLONEPLAN_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLONEPLAN_BUILD_N: &str = env!("CLONEPLAN_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "cloneplan {}\nBuild {}\nAssembly simulation and primer design for cloning strategies",
        CLONEPLAN_VERSION, CLONEPLAN_BUILD_N
    )
}
