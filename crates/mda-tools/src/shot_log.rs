//! # 拍摄日志格式
//!
//! JSON Lines 文件：第一行是头部（项目、设备、元数据），之后每个资产一行记录。
//!
//! ```text
//! {"type":"header","project_id":"MDA12345",...}
//! {"type":"shot","order":0,"timestamp":"...","feature":"septum",...}
//! {"type":"shot",...}
//! ```
//!
//! 会话结束后 [`JsonlShotLog::reorder`] 按报告顺序重写文件（拍摄顺序 ≠ 报告顺序）。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 一个资产的拍摄记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    /// 类别在报告顺序中的位置（不在表中时为 `None`，排在最后）
    pub order: Option<usize>,
    pub timestamp: DateTime<Local>,
    pub feature: String,
    /// 文件名
    pub image: String,
    /// 完整路径
    pub path: PathBuf,
    /// 快门速度（日志文本，分数带 `" s"` 后缀）
    pub tv: String,
    pub av: String,
    pub zoom: Option<u32>,
    pub iso: String,
    /// 曝光补偿（EV，保留一位小数）
    pub ec: Option<f64>,
}

/// 日志头部
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogHeader {
    pub project_id: String,
    pub device_code: String,
    pub created: Option<DateTime<Local>>,
    /// 零件号、描述等元数据
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogLine {
    Header(LogHeader),
    Shot(ShotRecord),
}

/// JSON Lines 拍摄日志
#[derive(Debug)]
pub struct JsonlShotLog {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

impl JsonlShotLog {
    /// 打开日志；文件不存在时创建并写入头部，已存在时追加
    pub fn open<P: AsRef<Path>>(path: P, header: &LogHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("创建日志目录失败")?;
        }
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("打开日志文件失败: {}", path.display()))?;
        let mut log = Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        };
        if existed {
            debug!("Appending to existing shot log {}", log.path.display());
        } else {
            log.write_line(&LogLine::Header(header.clone()))?;
            info!("Created shot log {}", log.path.display());
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 本次打开后写入的记录数
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// 追加一条记录（立即刷新，进程中断也不丢已拍摄的记录）
    pub fn append(&mut self, record: &ShotRecord) -> Result<()> {
        self.write_line(&LogLine::Shot(record.clone()))?;
        self.records += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &LogLine) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line).context("序列化日志记录失败")?;
        self.writer.write_all(b"\n").context("写入日志失败")?;
        self.writer.flush().context("刷新缓冲区失败")?;
        Ok(())
    }

    /// 读取整个日志
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<(Option<LogHeader>, Vec<ShotRecord>)> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("打开日志文件失败: {}", path.display()))?;
        let mut header = None;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("读取日志失败")?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: LogLine = serde_json::from_str(&line)
                .with_context(|| format!("第 {} 行不是有效的日志记录", index + 1))?;
            match parsed {
                LogLine::Header(h) => header = Some(h),
                LogLine::Shot(r) => records.push(r),
            }
        }
        Ok((header, records))
    }

    /// 按报告顺序重写日志
    ///
    /// 稳定排序：`order` 相同（同一类别多张）保持拍摄顺序，`None` 排在最后。
    /// 先写临时文件再重命名，失败时原文件不变。
    pub fn reorder<P: AsRef<Path>>(path: P) -> Result<usize> {
        let path = path.as_ref();
        let (header, mut records) = Self::read_all(path)?;
        records.sort_by_key(|r| r.order.unwrap_or(usize::MAX));

        let tmp = path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp).context("创建临时文件失败")?;
            let mut writer = BufWriter::new(file);
            let lines = header
                .into_iter()
                .map(LogLine::Header)
                .chain(records.iter().cloned().map(LogLine::Shot));
            for line in lines {
                serde_json::to_writer(&mut writer, &line).context("序列化日志记录失败")?;
                writer.write_all(b"\n").context("写入日志失败")?;
            }
            writer.flush().context("刷新缓冲区失败")?;
        }
        fs::rename(&tmp, path).context("替换日志文件失败")?;
        info!("Reordered {} log records in {}", records.len(), path.display());
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order: Option<usize>, feature: &str, image: &str) -> ShotRecord {
        ShotRecord {
            order,
            timestamp: Local::now(),
            feature: feature.to_string(),
            image: image.to_string(),
            path: PathBuf::from("/capture").join(image),
            tv: "1/60 s".to_string(),
            av: "8".to_string(),
            zoom: Some(140),
            iso: "100".to_string(),
            ec: Some(0.0),
        }
    }

    fn header() -> LogHeader {
        let mut metadata = BTreeMap::new();
        metadata.insert("Part number".to_string(), "887402-951".to_string());
        LogHeader {
            project_id: "MDA12345".to_string(),
            device_code: "DC123".to_string(),
            created: Some(Local::now()),
            metadata,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session/log.jsonl");
        let mut log = JsonlShotLog::open(&path, &header()).unwrap();
        log.append(&record(Some(1), "septum", "a.JPG")).unwrap();
        log.append(&record(None, "reference focus sticker", "b.JPG")).unwrap();
        assert_eq!(log.records_written(), 2);
        drop(log);

        let (h, records) = JsonlShotLog::read_all(&path).unwrap();
        assert_eq!(h.unwrap().project_id, "MDA12345");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image, "a.JPG");
        assert_eq!(records[1].order, None);
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        JsonlShotLog::open(&path, &header())
            .unwrap()
            .append(&record(Some(0), "a", "1.JPG"))
            .unwrap();
        JsonlShotLog::open(&path, &header())
            .unwrap()
            .append(&record(Some(0), "a", "2.JPG"))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("\"type\":\"header\"").count(), 1);
        assert_eq!(JsonlShotLog::read_all(&path).unwrap().1.len(), 2);
    }

    #[test]
    fn test_reorder_is_stable_with_unknown_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut log = JsonlShotLog::open(&path, &header()).unwrap();
        log.append(&record(None, "ref", "r.JPG")).unwrap();
        log.append(&record(Some(2), "c", "c1.JPG")).unwrap();
        log.append(&record(Some(0), "a", "a.JPG")).unwrap();
        log.append(&record(Some(2), "c", "c2.JPG")).unwrap();
        log.append(&record(Some(1), "b", "b.JPG")).unwrap();
        drop(log);

        assert_eq!(JsonlShotLog::reorder(&path).unwrap(), 5);
        let (h, records) = JsonlShotLog::read_all(&path).unwrap();
        assert!(h.is_some());
        let images: Vec<&str> = records.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(images, vec!["a.JPG", "b.JPG", "c1.JPG", "c2.JPG", "r.JPG"]);
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_corrupt_line_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{\"type\":\"shot\"\n").unwrap();
        let err = JsonlShotLog::read_all(&path).unwrap_err();
        assert!(err.to_string().contains("第 1 行"));
    }
}
