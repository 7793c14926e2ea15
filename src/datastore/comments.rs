use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Component, Path};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::utils::command::run_command;

/// 备注标签的最大字符数
pub const COMMENT_MAX_CHARS: usize = 48;

/// 快照列表中用到的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotInfo {
    #[serde(rename = "backup-type", default)]
    pub backup_type: String,

    #[serde(rename = "backup-id", default)]
    pub backup_id: String,

    #[serde(rename = "backup-time", default)]
    pub backup_time: i64,

    #[serde(default)]
    pub comment: Option<String>,
}

/// 虚拟机/容器在数据存储中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestLocation {
    /// 命名空间，例如 `prod/web`；根命名空间为空字符串
    pub namespace: String,
    pub backup_type: String,
    pub backup_id: String,
}

/// 从目录结构 `[ns/<name>/...]<vm|ct>/<id>` 推出位置
pub fn guest_location(datastore_root: &Path, guest_path: &Path) -> Option<GuestLocation> {
    let rel = guest_path.strip_prefix(datastore_root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    let mut namespace = Vec::new();
    let mut i = 0;
    while parts.get(i) == Some(&"ns") {
        namespace.push(*parts.get(i + 1)?);
        i += 2;
    }

    match (parts.get(i), parts.get(i + 1)) {
        (Some(&kind), Some(&id)) if (kind == "vm" || kind == "ct") && parts.len() == i + 2 => {
            Some(GuestLocation {
                namespace: namespace.join("/"),
                backup_type: kind.to_string(),
                backup_id: id.to_string(),
            })
        }
        _ => None,
    }
}

/// 解析快照列表，接受数组或 `{"data": [...]}`，无法识别的条目被跳过
pub fn parse_snapshot_list(output: &str) -> Vec<SnapshotInfo> {
    let value: serde_json::Value = match serde_json::from_str(output) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("快照列表不是有效的 JSON: {}", err);
            return Vec::new();
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// 只保留备注的第一个词，过长时截断
pub fn simplify_comment(raw: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    if first.chars().count() > COMMENT_MAX_CHARS {
        let mut short: String = first.chars().take(COMMENT_MAX_CHARS - 1).collect();
        short.push('…');
        Some(short)
    } else {
        Some(first.to_string())
    }
}

/// 该虚拟机/容器最新快照的备注
pub fn latest_comment(snapshots: &[SnapshotInfo], location: &GuestLocation) -> Option<String> {
    snapshots
        .iter()
        .filter(|s| s.backup_id == location.backup_id && s.backup_type == location.backup_type)
        .max_by_key(|s| s.backup_time)
        .and_then(|s| s.comment.as_deref())
        .and_then(simplify_comment)
}

/// 按命名空间缓存快照列表的备注查询；尽力而为，任何失败都只是没有标签
pub struct GuestComments {
    datastore: String,
    program: String,
    timeout: Duration,
    snapshots: HashMap<String, Vec<SnapshotInfo>>,
}

impl GuestComments {
    pub fn new(datastore: &str, config: &Config) -> Self {
        Self {
            datastore: datastore.to_string(),
            program: config.tools.debug_command.clone(),
            timeout: config.tools.snapshot_timeout(),
            snapshots: HashMap::new(),
        }
    }

    pub async fn comment_for(
        &mut self,
        datastore_root: &Path,
        guest_path: &Path,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let location = guest_location(datastore_root, guest_path)?;

        if !self.snapshots.contains_key(&location.namespace) {
            let list = self.load(&location.namespace, cancel).await;
            self.snapshots.insert(location.namespace.clone(), list);
        }

        let snapshots = self.snapshots.get(&location.namespace)?;
        latest_comment(snapshots, &location)
    }

    async fn load(&self, namespace: &str, cancel: &CancellationToken) -> Vec<SnapshotInfo> {
        let endpoint = format!("/admin/datastore/{}/snapshots", self.datastore);
        let mut args = vec!["api", "get", endpoint.as_str(), "--output-format", "json"];
        if !namespace.is_empty() {
            args.extend(["--ns", namespace]);
        }

        match run_command(&self.program, &args, self.timeout, cancel).await {
            Ok(output) if output.success() => parse_snapshot_list(&output.stdout),
            Ok(output) => {
                tracing::debug!("查询快照列表失败: {}", output.stderr.trim());
                Vec::new()
            }
            Err(err) => {
                tracing::debug!("查询快照列表失败: {}", err);
                Vec::new()
            }
        }
    }
}
