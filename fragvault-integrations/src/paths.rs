use std::path::{Path, PathBuf};

use crate::ids::{APP_NAME, DB_FILE_NAME};

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_NAME))
}

pub fn default_db_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join(DB_FILE_NAME))
}

pub fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde_prefix() {
        let home = PathBuf::from("/home/user");
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(
            expand_with_home("~/vault/db.sqlite3", &home),
            PathBuf::from("/home/user/vault/db.sqlite3")
        );
        assert_eq!(
            expand_with_home("/var/lib/fragvault", &home),
            PathBuf::from("/var/lib/fragvault")
        );
    }

    #[test]
    fn default_db_path_ends_with_file_name() {
        if let Some(path) = default_db_path() {
            assert!(path.ends_with(Path::new(APP_NAME).join(DB_FILE_NAME)));
        }
    }
}
