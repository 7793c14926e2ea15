use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 备份对象类型目录名
const GUEST_KINDS: [&str; 2] = ["vm", "ct"];

/// 命名空间目录名
const NAMESPACE_DIR: &str = "ns";

/// 查找扫描根下所有虚拟机/容器目录，递归进入嵌套的命名空间
///
/// 结果按路径（不区分大小写）排序，跳过隐藏目录。
pub fn discover_guest_paths(scan_root: &Path) -> Vec<PathBuf> {
    let mut guests = Vec::new();
    let mut seen = HashSet::new();

    scan_namespace(scan_root, &mut guests, &mut seen);

    guests.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    guests
}

fn scan_namespace(base: &Path, guests: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>) {
    for kind in GUEST_KINDS {
        for child in visible_subdirs(&base.join(kind)) {
            let resolved = child.canonicalize().unwrap_or(child);
            if seen.insert(resolved.clone()) {
                guests.push(resolved);
            }
        }
    }

    for namespace in visible_subdirs(&base.join(NAMESPACE_DIR)) {
        scan_namespace(&namespace, guests, seen);
    }
}

/// 列出非隐藏的子目录，无法读取时返回空列表
fn visible_subdirs(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if dir.exists() {
                tracing::warn!("无法读取目录 {}: {}", dir.display(), err);
            }
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    dirs
}

/// 相对数据存储根的显示标签，例如 `/ns/prod/vm/100`
pub fn guest_label(datastore_root: &Path, guest_path: &Path) -> String {
    match guest_path.strip_prefix(datastore_root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => guest_path.display().to_string(),
    }
}
