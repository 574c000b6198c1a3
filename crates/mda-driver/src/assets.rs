//! 捕获目录：资产命名与回退扫描
//!
//! 回调路径没有交付任何文件时，比较拍摄前后的目录快照找出新文件。

use chrono::{DateTime, TimeZone};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 资产文件名：`<项目ID>_<类别（空格→下划线）>_<HHMMSS>.JPG`
pub fn asset_file_name<Tz>(project_id: &str, category: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}_{}.JPG",
        project_id,
        category.trim().replace(' ', "_"),
        at.format("%H%M%S")
    )
}

/// 目录中不冲突的路径：同名时追加 `_1`、`_2`……
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1u32..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// 是否为图像资产（`.jpg` / `.jpeg`，不区分大小写）
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// 目录中现有图像的快照（目录不存在时为空）
pub fn snapshot_images(dir: &Path) -> io::Result<HashSet<PathBuf>> {
    if !dir.exists() {
        return Ok(HashSet::new());
    }
    let mut images = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.insert(path);
        }
    }
    Ok(images)
}

/// 快照之后新出现的图像，按修改时间（相同时按路径）排序
pub fn new_images_since(dir: &Path, baseline: &HashSet<PathBuf>) -> io::Result<Vec<PathBuf>> {
    let mut fresh: Vec<(SystemTime, PathBuf)> = snapshot_images(dir)?
        .into_iter()
        .filter(|p| !baseline.contains(p))
        .map(|p| {
            let mtime = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (mtime, p)
        })
        .collect();
    fresh.sort();
    Ok(fresh.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_asset_file_name() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
            .and_utc();
        assert_eq!(
            asset_file_name("MDA12345", "Left Side Panel", &at),
            "MDA12345_Left_Side_Panel_090507.JPG"
        );
        let now = Utc::now();
        assert!(asset_file_name("P", "x", &now).ends_with(".JPG"));
    }

    #[test]
    fn test_unique_path_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "A_b_120000.JPG");
        assert_eq!(first, dir.path().join("A_b_120000.JPG"));
        fs::write(&first, b"x").unwrap();
        let second = unique_path(dir.path(), "A_b_120000.JPG");
        assert_eq!(second, dir.path().join("A_b_120000_1.JPG"));
        fs::write(&second, b"x").unwrap();
        assert_eq!(
            unique_path(dir.path(), "A_b_120000.JPG"),
            dir.path().join("A_b_120000_2.JPG")
        );
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/IMG_0001.JPG")));
        assert!(is_image(Path::new("b.jpeg")));
        assert!(!is_image(Path::new("c.CR3")));
        assert!(!is_image(Path::new("noext")));
    }

    #[test]
    fn test_new_images_since_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.jpg"), b"x").unwrap();
        let baseline = snapshot_images(dir.path()).unwrap();
        assert_eq!(baseline.len(), 1);

        fs::write(dir.path().join("new.JPG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let fresh = new_images_since(dir.path(), &baseline).unwrap();
        assert_eq!(fresh, vec![dir.path().join("new.JPG")]);
    }

    #[test]
    fn test_snapshot_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(snapshot_images(&missing).unwrap().is_empty());
        assert!(new_images_since(&missing, &HashSet::new()).unwrap().is_empty());
    }
}
