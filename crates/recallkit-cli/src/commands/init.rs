//! The `recallkit init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("recallkit.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("data")?;
    write_if_missing(Path::new("data/example-events.json"), EXAMPLE_EVENTS)?;
    write_if_missing(Path::new("data/example-distances.json"), EXAMPLE_DISTANCES)?;

    println!("\nNext steps:");
    println!("  1. Run: recallkit validate --events data/example-events.json");
    println!("  2. Run: recallkit score --events data/example-events.json");
    println!("  3. Run: recallkit analyze --events data/example-events.json --measure lag-crp");
    println!(
        "  4. Run: recallkit analyze --events data/example-events.json --measure category-crp --category-key category"
    );

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# recallkit configuration

# Worker threads for per-subject analysis (0 = one per core)
parallelism = 0
output_dir = "./recallkit-results"
default_format = "json"

[scoring]
# Columns that must also match between study and recall events
list_keys = []
# Columns carried from study events
study_keys = ["category", "item_index"]
# Columns carried from recall events
recall_keys = []
"#;

const EXAMPLE_EVENTS: &str = r#"{
  "subjects": [1, 1],
  "study": [
    ["apple", "pear", "plum", "fig", "hammer", "saw", "drill", "wrench"],
    ["grape", "lime", "peach", "kiwi", "pliers", "chisel", "file", "clamp"]
  ],
  "recall": [
    ["apple", "plum", "fig", "wrench", "hammer", "fig", "drill", "saw"],
    ["peach", "grape", "lime", "saw", "chisel", "pliers"]
  ],
  "columns": {
    "category": {
      "study": [
        ["fruit", "fruit", "fruit", "fruit", "tool", "tool", "tool", "tool"],
        ["fruit", "fruit", "fruit", "fruit", "tool", "tool", "tool", "tool"]
      ]
    },
    "item_index": {
      "study": [
        [0, 1, 2, 3, 4, 5, 6, 7],
        [0, 1, 2, 3, 4, 5, 6, 7]
      ]
    }
  }
}
"#;

const EXAMPLE_DISTANCES: &str = r#"[
  [0, 1, 1, 1, 2, 2, 2, 2],
  [1, 0, 1, 1, 2, 2, 2, 2],
  [1, 1, 0, 1, 2, 2, 2, 2],
  [1, 1, 1, 0, 2, 2, 2, 2],
  [2, 2, 2, 2, 0, 3, 3, 3],
  [2, 2, 2, 2, 3, 0, 3, 3],
  [2, 2, 2, 2, 3, 3, 0, 3],
  [2, 2, 2, 2, 3, 3, 3, 0]
]
"#;
