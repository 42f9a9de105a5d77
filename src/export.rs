use anyhow::{Context, Result};
use log::info;
use std::{fs, path::PathBuf};

pub const EXPORT_FILENAME: &str = if cfg!(test) {
    "extracted_text_test.txt"
} else {
    "extracted_text.txt"
};

/// The user facing output text. Follows the generated text until the user edits it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputText {
    pub text: String,
    user_modified: bool,
}

impl OutputText {
    /// Take over `generated` while a job streams or the user has not touched the text.
    pub fn sync(&mut self, generated: &str, is_generating: bool) {
        if is_generating {
            self.user_modified = false;
        }
        if !self.user_modified && self.text != generated {
            self.text.clear();
            self.text.push_str(generated);
        }
    }

    pub fn mark_edited(&mut self) {
        self.user_modified = true;
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.user_modified = false;
    }

    pub fn is_user_modified(&self) -> bool {
        self.user_modified
    }
}

/// Writes `text` as UTF-8 into the output directory and returns the file path.
pub fn write_text(text: &str) -> Result<PathBuf> {
    let path = get_output_path(EXPORT_FILENAME)?;
    fs::write(&path, text).with_context(|| format!("Unable to write {path:?}"))?;
    info!("Exported {} bytes to {path:?}", text.len());
    Ok(path)
}

fn get_output_path(filename: &str) -> Result<PathBuf> {
    let path_buf = std::env::current_dir()
        .context("unable to get current_dir")?
        .join("output");

    fs::create_dir_all(&path_buf)
        .with_context(|| format!("Unable to create output directory: {path_buf:?}"))?;

    Ok(path_buf.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn follows_generation_until_edited() {
        let mut output = OutputText::default();
        output.sync("Region 1:\nab", true);
        assert_eq!(output.text, "Region 1:\nab");

        output.sync("Region 1:\nabc", false);
        output.text = "my fix".to_string();
        output.mark_edited();
        output.sync("Region 1:\nabc", false);
        assert_eq!(output.text, "my fix");
        assert!(output.is_user_modified());

        // a new job takes over again
        output.sync("Region 1:\nx", true);
        assert_eq!(output.text, "Region 1:\nx");
        assert!(!output.is_user_modified());
    }

    #[test]
    fn clear_resets_edit_flag() {
        let mut output = OutputText::default();
        output.text.push_str("typed");
        output.mark_edited();
        output.clear();
        assert_eq!(output, OutputText::default());
    }

    #[test]
    #[serial]
    fn write_text_as_utf8() {
        let text = "Region 1:\nこんにちは\n\nRegion 2:\n  indented";
        let path = write_text(text).unwrap();

        assert!(path.ends_with(format!("output/{EXPORT_FILENAME}")));
        assert_eq!(fs::read_to_string(&path).unwrap(), text);
        fs::remove_file(path).unwrap();
    }

    #[test]
    #[serial]
    fn write_empty_text() {
        let path = write_text("").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        fs::remove_file(path).unwrap();
    }
}
