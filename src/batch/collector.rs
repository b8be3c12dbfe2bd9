//! # 原生输出目录收集器
//!
//! 在根目录下查找包含标志文件的 DFT 原生输出目录。
//!
//! ## 功能
//! - 支持单个计算目录和根目录输入
//! - glob 模式匹配标志文件（逗号分隔的多模式）
//! - 可选递归搜索
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 与 `commands/convert.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{DockError, Result};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 目录收集器
pub struct DatasetCollector {
    /// 根目录
    root: PathBuf,
    /// 标志文件模式列表
    patterns: Vec<glob::Pattern>,
    /// 是否递归
    recursive: bool,
}

impl DatasetCollector {
    /// 创建新的收集器，标志文件模式为逗号分隔的 glob
    pub fn new(root: PathBuf, marker: &str) -> Result<Self> {
        let patterns = marker
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                glob::Pattern::new(s).map_err(|e| {
                    DockError::InvalidArgument(format!("Invalid pattern '{}': {}", s, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(DockError::InvalidArgument(format!(
                "Empty marker pattern '{}'",
                marker
            )));
        }

        Ok(Self {
            root,
            patterns,
            recursive: false,
        })
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有含标志文件的目录（有序、去重）
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(DockError::DirectoryNotFound {
                path: self.root.display().to_string(),
            });
        }

        // 非递归时只看根目录本身及其直接子目录
        let max_depth = if self.recursive { usize::MAX } else { 2 };

        let dirs: BTreeSet<PathBuf> = WalkDir::new(&self.root)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.matches(e.path()))
            .filter_map(|e| e.path().parent().map(Path::to_path_buf))
            .collect();

        Ok(dirs.into_iter().collect())
    }

    fn matches(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.patterns.iter().any(|p| p.matches(name)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collects_marker_directories() {
        let root = std::env::temp_dir().join(format!("hamdock_collect_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("a/wannier90_hr.dat"), "").unwrap();
        fs::write(root.join("b/nested/wannier90_hr.dat"), "").unwrap();
        fs::write(root.join("c/notes.txt"), "").unwrap();

        let flat = DatasetCollector::new(root.clone(), "*_hr.dat")
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(flat, vec![root.join("a")]);

        let deep = DatasetCollector::new(root.clone(), "*_hr.dat")
            .unwrap()
            .recursive(true)
            .collect()
            .unwrap();
        assert_eq!(deep, vec![root.join("a"), root.join("b/nested")]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_rejects_empty_pattern() {
        assert!(DatasetCollector::new(PathBuf::from("."), " , ").is_err());
    }
}
