// Zenith Agent Engine — Project export
// The project triple maps to three fixed files, written byte-for-byte
// from the store fields.

use crate::atoms::error::EngineResult;
use crate::engine::project::{FileTarget, Project};
use log::info;
use std::fs;
use std::path::Path;

pub fn write_project_files(project: &Project, dir: &Path) -> EngineResult<()> {
    fs::create_dir_all(dir)?;
    for target in FileTarget::ALL {
        fs::write(dir.join(target.export_file_name()), project.file(target))?;
    }
    info!("[engine] Project exported to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_the_three_fixed_files_verbatim() {
        let dir = std::env::temp_dir().join(format!("zenith-export-{}", uuid::Uuid::new_v4()));
        let project = Project {
            html: "<p>ü</p>".into(),
            css: "p{}".into(),
            javascript: "// js\n".into(),
        };
        write_project_files(&project, &dir).unwrap();
        assert_eq!(fs::read(dir.join("index.html")).unwrap(), "<p>ü</p>".as_bytes());
        assert_eq!(fs::read(dir.join("styles.css")).unwrap(), b"p{}");
        assert_eq!(fs::read(dir.join("script.js")).unwrap(), b"// js\n");
        fs::remove_dir_all(&dir).ok();
    }
}
