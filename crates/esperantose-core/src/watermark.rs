//! File-backed watermark persistence.
//!
//! One text line per file. Writes go through a sibling `.tmp` file and a rename
//! so a reader never observes a half-written value.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{domain::Watermark, errors::Error, Result};

pub struct WatermarkStore<W> {
    path: PathBuf,
    default: Option<fn() -> W>,
}

impl<W: Watermark> WatermarkStore<W> {
    /// A store whose missing file means "no watermark yet".
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default: None,
        }
    }

    /// Use `default` (evaluated at load time) when nothing has been persisted.
    pub fn with_default(mut self, default: fn() -> W) -> Self {
        self.default = Some(default);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<W>> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.default.map(|f| f())),
            Err(e) => return Err(Error::Io(e)),
        };

        let raw = txt.trim();
        if raw.is_empty() {
            return Ok(self.default.map(|f| f()));
        }

        W::decode(raw).map(Some).map_err(|reason| Error::CorruptState {
            path: self.path.clone(),
            reason,
        })
    }

    pub fn save(&self, w: &W) -> Result<()> {
        let tmp = tmp_path(&self.path);
        {
            let mut f = fs::File::create(&tmp)?;
            writeln!(f, "{}", w.encode())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Published, UnixTime, UpdateId};
    use std::time::Duration;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        std::env::temp_dir().join(format!("{prefix}-{pid}-{ts}"))
    }

    #[test]
    fn missing_file_without_default_is_none() {
        let store = WatermarkStore::<UpdateId>::new(tmp_file("esose-wm-none"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn missing_file_uses_default() {
        let store = WatermarkStore::<UnixTime>::new(tmp_file("esose-wm-default"))
            .with_default(|| UnixTime::hours_ago(48));
        let w = store.load().unwrap().unwrap();
        let expected = UnixTime::now().0 - 48 * 60 * 60;
        assert!((w.0 - expected).abs() <= 5);
    }

    #[test]
    fn save_then_load_returns_value() {
        let path = tmp_file("esose-wm-save");
        let store = WatermarkStore::<UpdateId>::new(&path);
        store.save(&UpdateId(42)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "42\n");
        assert_eq!(store.load().unwrap(), Some(UpdateId(42)));

        store.save(&UpdateId(43)).unwrap();
        assert_eq!(store.load().unwrap(), Some(UpdateId(43)));
        assert!(!tmp_path(&path).exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn published_watermark_is_stored_as_rfc3339() {
        let path = tmp_file("esose-wm-published");
        let store = WatermarkStore::<Published>::new(&path);
        let p = Published::decode("2024-03-10T08:15:00Z").unwrap();
        store.save(&p).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2024-03-10T08:15:00Z\n");
        assert_eq!(store.load().unwrap(), Some(p));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fractional_published_watermark_survives_a_restart() {
        use crate::dedup::select_new;
        use crate::domain::Question;

        let path = tmp_file("esose-wm-fraction");
        let store = WatermarkStore::<Published>::new(&path);
        let p = Published::decode("2024-05-02T09:30:11.500Z").unwrap();
        store.save(&p).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2024-05-02T09:30:11.500Z\n"
        );

        let loaded = store.load().unwrap();
        assert_eq!(loaded, Some(p));

        let last_sent = Question {
            position: p,
            title: "Saluton".to_string(),
            link: "http://x/1".to_string(),
            question_id: Some(1),
        };
        let again = select_new(loaded.as_ref(), vec![last_sent]).unwrap();
        assert!(again.is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn garbage_is_corrupt_state() {
        let path = tmp_file("esose-wm-corrupt");
        fs::write(&path, "not-a-number\n").unwrap();
        let store = WatermarkStore::<UpdateId>::new(&path);
        match store.load() {
            Err(Error::CorruptState { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptState, got {other:?}"),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn blank_file_is_treated_as_absent() {
        let path = tmp_file("esose-wm-blank");
        fs::write(&path, "\n").unwrap();
        let store = WatermarkStore::<UpdateId>::new(&path);
        assert_eq!(store.load().unwrap(), None);
        let _ = fs::remove_file(&path);
    }
}
