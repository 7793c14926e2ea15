use regex::Regex;
use std::ffi::OsStr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, InspectFormat};
use crate::models::{ChunkDigest, ExtractionError, IndexFile, ReferenceBatch};
use crate::utils::command::{run_command_blocking, CommandError};

/// chunks 段的起始标记
const CHUNK_SECTION_MARKER: &str = "chunks:";

/// 带双引号的 64 位十六进制摘要
fn quoted_digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([0-9A-Fa-f]{64})""#).expect("静态正则表达式"))
}

/// 索引文件检查接口，每次调用处理一个索引文件
pub trait IndexInspector: Send + Sync {
    /// 检查失败不会返回错误，而是记录在失败的批次中
    fn inspect(&self, index: &IndexFile, cancel: &CancellationToken) -> ReferenceBatch;
}

/// 解析器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionState {
    /// 尚未遇到 chunks: 标记
    Outside,
    /// 位于 chunks 段内
    Inside,
    /// chunks 段已结束，后续行全部忽略
    Finished,
}

/// 文本输出的 chunks 段解析器
///
/// 标记行之后的每一行都必须包含一个带引号的摘要；第一个不匹配的行结束该段，
/// 之后即使出现类似摘要的内容也不再计入（索引文件会在块列表之后追加元数据）。
#[derive(Debug)]
pub struct ChunkSectionParser {
    state: SectionState,
    digests: Vec<ChunkDigest>,
}

impl Default for ChunkSectionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkSectionParser {
    pub fn new() -> Self {
        Self {
            state: SectionState::Outside,
            digests: Vec::new(),
        }
    }

    /// 处理一行输出
    pub fn push_line(&mut self, line: &str) {
        match self.state {
            SectionState::Outside => {
                if line.trim_start().starts_with(CHUNK_SECTION_MARKER) {
                    self.state = SectionState::Inside;
                }
            }
            SectionState::Inside => {
                let digest = quoted_digest_pattern()
                    .captures(line)
                    .and_then(|caps| ChunkDigest::parse(&caps[1]).ok());
                match digest {
                    Some(digest) => self.digests.push(digest),
                    None => self.state = SectionState::Finished,
                }
            }
            SectionState::Finished => {}
        }
    }

    /// 结束解析；从未出现标记行时视为无法解析的输出
    pub fn finish(self) -> Result<Vec<ChunkDigest>, ExtractionError> {
        match self.state {
            SectionState::Outside => Err(ExtractionError::MissingChunkSection),
            SectionState::Inside | SectionState::Finished => Ok(self.digests),
        }
    }
}

/// 解析 `--output-format text` 的输出
pub fn parse_text_output(output: &str) -> Result<Vec<ChunkDigest>, ExtractionError> {
    let mut parser = ChunkSectionParser::new();
    for line in output.lines() {
        parser.push_line(line);
    }
    parser.finish()
}

/// 解析 `--output-format json` 的输出
///
/// 接受 `{"chunks": [...]}`，数组元素可以是摘要字符串或带 `digest` 字段的对象。
pub fn parse_json_output(output: &str) -> Result<Vec<ChunkDigest>, ExtractionError> {
    let value: serde_json::Value = serde_json::from_str(output)
        .map_err(|err| ExtractionError::MalformedJson(err.to_string()))?;

    let chunks = value
        .get("chunks")
        .and_then(|chunks| chunks.as_array())
        .ok_or_else(|| ExtractionError::MalformedJson("缺少 chunks 数组".to_string()))?;

    let digests = chunks
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => map.get("digest").and_then(|d| d.as_str()),
            _ => None,
        })
        .filter_map(|s| match ChunkDigest::parse(s) {
            Ok(digest) => Some(digest),
            Err(err) => {
                tracing::debug!("跳过无效摘要: {}", err);
                None
            }
        })
        .collect();

    Ok(digests)
}

impl From<CommandError> for ExtractionError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { command, reason } => ExtractionError::Spawn { command, reason },
            CommandError::NotFound(command) => ExtractionError::Spawn {
                command,
                reason: "命令不存在".to_string(),
            },
            CommandError::Timeout(timeout) => ExtractionError::Timeout(timeout),
            CommandError::Cancelled => ExtractionError::Cancelled,
            CommandError::Io(reason) => ExtractionError::Io(reason),
        }
    }
}

/// 通过 `<tool> inspect file --output-format <fmt> <path>` 提取引用
///
/// 检查在 rayon 工作线程中同步调用，子进程由 tokio 运行时驱动。
pub struct ReferenceExtractor {
    program: String,
    timeout: Duration,
    format: InspectFormat,
    runtime: Handle,
}

impl ReferenceExtractor {
    pub fn new(
        program: impl Into<String>,
        timeout: Duration,
        format: InspectFormat,
        runtime: Handle,
    ) -> Self {
        Self {
            program: program.into(),
            timeout,
            format,
            runtime,
        }
    }

    pub fn from_config(config: &Config, runtime: Handle) -> Self {
        Self::new(
            config.tools.debug_command.clone(),
            config.tools.inspect_timeout(),
            config.scan.inspect_format,
            runtime,
        )
    }

    /// 以指定格式运行一次检查命令并解析输出
    fn run_inspect(
        &self,
        index: &IndexFile,
        format: InspectFormat,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkDigest>, ExtractionError> {
        let output = run_command_blocking(
            &self.runtime,
            &self.program,
            [
                OsStr::new("inspect"),
                OsStr::new("file"),
                OsStr::new("--output-format"),
                OsStr::new(format.as_arg()),
                index.path().as_os_str(),
            ],
            self.timeout,
            cancel,
        )?;

        if !output.success() {
            return Err(ExtractionError::ExitStatus {
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        match format {
            InspectFormat::Text => parse_text_output(&output.stdout),
            InspectFormat::Json => parse_json_output(&output.stdout),
        }
    }
}

impl IndexInspector for ReferenceExtractor {
    fn inspect(&self, index: &IndexFile, cancel: &CancellationToken) -> ReferenceBatch {
        let mut result = self.run_inspect(index, self.format, cancel);

        // JSON 输出不可用时回退到文本格式
        if self.format == InspectFormat::Json {
            if let Err(ExtractionError::MalformedJson(reason)) = &result {
                tracing::debug!(
                    "{} 的 JSON 输出无法解析（{}），改用文本格式",
                    index.path().display(),
                    reason
                );
                result = self.run_inspect(index, InspectFormat::Text, cancel);
            }
        }

        match result {
            Ok(digests) => {
                tracing::debug!("{}: {} 个引用", index.path().display(), digests.len());
                ReferenceBatch::parsed(index.path().to_path_buf(), digests)
            }
            Err(err) => ReferenceBatch::failed(index.path().to_path_buf(), err),
        }
    }
}
