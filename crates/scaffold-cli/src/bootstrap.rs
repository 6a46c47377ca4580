//! Deterministic bootstrap planner.
//!
//! Produces a small, runnable Python project without any external planner,
//! so the write-and-validate loop can be smoke tested end to end.

use scaffold_core::requirements::lookup;
use scaffold_core::{FileBatch, FileEntry, Result};
use serde_json::Value;

const DEFAULT_NAME: &str = "Project";

const APP_PY: &str = "def add(a, b):\n    return a + b\n\n\nif __name__ == '__main__':\n    print('hello from bootstrap')\n";

const TEST_SMOKE_PY: &str = "from src.app import add\n\n\ndef test_add():\n    assert add(1, 2) == 3\n";

const GITIGNORE: &str = "__pycache__/\n.pytest_cache/\n.env\n";

/// Plan the bootstrap scaffold, naming it after `project.name` when present.
pub fn plan(requirements: Option<&Value>) -> Result<FileBatch> {
    let name = requirements
        .and_then(|req| lookup(req, &["project", "name"]))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_NAME);
    let description = requirements
        .and_then(|req| lookup(req, &["project", "description"]))
        .and_then(Value::as_str)
        .unwrap_or("Generated by bootstrap.");

    [
        ("README.md", readme(name, description)),
        ("src/__init__.py", String::new()),
        ("src/app.py", APP_PY.to_string()),
        ("tests/test_smoke.py", TEST_SMOKE_PY.to_string()),
        (".gitignore", GITIGNORE.to_string()),
        ("pyproject.toml", pyproject(&slug(name))),
    ]
    .into_iter()
    .map(|(path, content)| FileEntry::new(path, content))
    .collect()
}

fn readme(name: &str, description: &str) -> String {
    format!("# {name}\n\n{description}\n\n## Tests\n\n```bash\npython -m pytest -q\n```\n")
}

fn pyproject(slug: &str) -> String {
    format!(
        "[project]\nname = \"{slug}\"\nversion = \"0.1.0\"\n\n\
         [build-system]\nrequires = [\"setuptools\", \"wheel\"]\n\n\
         [tool.pytest.ini_options]\npythonpath = [\".\"]\n"
    )
}

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slug(name: &str) -> String {
    let lowered: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = lowered
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}
