use pagesim_vm::{ConfigError, Inconsistency, VmError};
use std::{fmt, io};

/// 模拟器错误。
#[derive(Debug)]
pub enum SimError {
    /// 读场景文件失败
    Io(io::Error),
    /// 场景文件格式错误
    Toml(toml::de::Error),
    /// 虚存配置错误
    Config(ConfigError),
    /// 虚存操作错误
    Vm(VmError),
    /// 终止计划引用了不存在的上下文
    UnknownContext(String),
    /// 上下文重名
    DuplicateContext(String),
    /// 没有可运行的上下文，也没有未完成的 I/O 和终止计划，但仍有上下文在等待
    Deadlock(Vec<String>),
    /// 运行结束后页帧与页不一致
    Audit(Inconsistency),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read scenario: {e}"),
            Self::Toml(e) => write!(f, "malformed scenario: {e}"),
            Self::Config(e) => write!(f, "invalid memory configuration: {e}"),
            Self::Vm(e) => write!(f, "{e}"),
            Self::UnknownContext(name) => write!(f, "no context named `{name}`"),
            Self::DuplicateContext(name) => write!(f, "context `{name}` defined twice"),
            Self::Deadlock(waiting) => {
                write!(f, "deadlock, still waiting: {}", waiting.join(", "))
            }
            Self::Audit(e) => write!(f, "memory audit failed: {e}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SimError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for SimError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<VmError> for SimError {
    fn from(e: VmError) -> Self {
        Self::Vm(e)
    }
}

impl From<Inconsistency> for SimError {
    fn from(e: Inconsistency) -> Self {
        Self::Audit(e)
    }
}
