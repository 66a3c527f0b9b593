use clinicscan::browser::ScriptedDriver;
use std::path::PathBuf;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Serve `sites/<name>` fixture files at `<base><path>` for each entry
pub fn scripted_site(base: &str, pages: &[(&str, &str)]) -> ScriptedDriver {
    pages.iter().fold(ScriptedDriver::new(), |driver, (path, name)| {
        driver.page(&format!("{}{}", base, path), load_fixture(&format!("sites/{}", name)))
    })
}
