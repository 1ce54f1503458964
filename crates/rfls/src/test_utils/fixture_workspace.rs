//! Deterministic fixture workspaces for benchmarks and integration tests.
//!
//! A suite imports a chain of resource files; every resource defines a
//! number of keywords and the suite calls them, some through meta-keywords.

use std::fmt::Write;
use std::path::Path;

use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub resource_count: usize,
    pub keywords_per_resource: usize,
    pub test_count: usize,
}

impl FixtureConfig {
    pub fn small() -> Self {
        Self {
            resource_count: 3,
            keywords_per_resource: 10,
            test_count: 10,
        }
    }

    pub fn large() -> Self {
        Self {
            resource_count: 20,
            keywords_per_resource: 50,
            test_count: 200,
        }
    }
}

fn resource_content(index: usize, config: &FixtureConfig) -> String {
    let mut content = String::new();
    if index + 1 < config.resource_count {
        let _ = writeln!(content, "*** Settings ***");
        let _ = writeln!(content, "Resource    resource_{}.resource\n", index + 1);
    }
    let _ = writeln!(content, "*** Keywords ***");
    for kw in 0..config.keywords_per_resource {
        let _ = writeln!(content, "Resource {} Keyword {}", index, kw);
        let _ = writeln!(content, "    [Arguments]    ${{value}}=default");
        let _ = writeln!(content, "    Log    ${{value}}");
    }
    content
}

/// The suite file, calling keywords from every resource.
pub fn suite_content(config: &FixtureConfig) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "*** Settings ***");
    let _ = writeln!(content, "Resource    resource_0.resource\n");
    let _ = writeln!(content, "*** Test Cases ***");
    for test in 0..config.test_count {
        let resource = test % config.resource_count.max(1);
        let keyword = test % config.keywords_per_resource.max(1);
        let _ = writeln!(content, "Test {}", test);
        let _ = writeln!(content, "    Resource {} Keyword {}    arg", resource, keyword);
        let _ = writeln!(
            content,
            "    Run Keyword If    ${{True}}    Resource {} Keyword {}    ELSE    Log    nope",
            resource, keyword
        );
        let _ = writeln!(
            content,
            "    Run Keywords    No Operation    AND    Log    done"
        );
    }
    content
}

/// Write the resources and `suite.robot` into `dir`.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) -> std::io::Result<()> {
    for index in 0..config.resource_count {
        std::fs::write(
            dir.join(format!("resource_{}.resource", index)),
            resource_content(index, config),
        )?;
    }
    std::fs::write(dir.join("suite.robot"), suite_content(config))
}

pub fn create_fixture_workspace(config: &FixtureConfig) -> std::io::Result<TempDir> {
    let dir = TempDir::new()?;
    write_fixture_workspace(dir.path(), config)?;
    Ok(dir)
}
