//! TOML 场景文件。
//!
//! ```toml
//! [memory]
//! frames = 4
//! policy = "fifo"
//!
//! [device]
//! latency = 3
//!
//! [[task]]
//! name = "a"
//! [[task.context]]
//! ops = [{ write = { addr = 0x400, value = 7 } }, "yield", { read = 0x400 }]
//!
//! [[kill]]
//! context = "a.0"
//! at = 10
//! ```

use crate::SimError;
use pagesim_vm::{PolicyKind, VmConfig};
use serde_derive::Deserialize;
use std::{collections::BTreeSet, fs, path::Path, str::FromStr};

/// 一个模拟场景。
#[derive(Deserialize, Default, Clone, Debug)]
pub struct Scenario {
    /// 虚存配置
    #[serde(default)]
    pub memory: Memory,
    /// 换页设备
    #[serde(default)]
    pub device: Device,
    /// 任务
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskSpec>,
    /// 终止计划
    #[serde(default, rename = "kill")]
    pub kills: Vec<KillSpec>,
}

/// `[memory]`，缺省值同 [`VmConfig::default`]。
#[derive(Deserialize, Default, Clone, Debug)]
pub struct Memory {
    /// 虚地址位数
    pub virtual_address_bits: Option<u32>,
    /// 页号位数
    pub page_address_bits: Option<u32>,
    /// 页帧数
    pub frames: Option<usize>,
    /// 置换算法
    pub policy: Option<String>,
    /// 时钟算法一次希望腾出的页帧数
    pub frames_wanted: Option<usize>,
}

/// `[device]`
#[derive(Deserialize, Default, Clone, Debug)]
pub struct Device {
    /// 每次换页花费的时钟周期
    pub latency: Option<u64>,
}

/// `[[task]]`
#[derive(Deserialize, Default, Clone, Debug)]
pub struct TaskSpec {
    /// 任务名，缺省为 `task{i}`
    pub name: Option<String>,
    /// 执行上下文
    #[serde(default, rename = "context")]
    pub contexts: Vec<ContextSpec>,
}

/// `[[task.context]]`
#[derive(Deserialize, Default, Clone, Debug)]
pub struct ContextSpec {
    /// 上下文名，缺省为 `{任务名}.{j}`
    pub name: Option<String>,
    /// 依次执行的操作
    #[serde(default)]
    pub ops: Vec<Op>,
}

/// `[[kill]]`：在第 `at` 个周期终止上下文。
#[derive(Deserialize, Clone, Debug)]
pub struct KillSpec {
    /// 上下文名
    pub context: String,
    /// 时刻
    pub at: u64,
}

/// 上下文执行的操作。
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// 读地址
    Read(usize),
    /// 写地址
    Write {
        /// 地址
        addr: usize,
        /// 写入的值
        value: u64,
    },
    /// 锁定地址所在的页
    Lock(usize),
    /// 解锁地址所在的页
    Unlock(usize),
    /// 让出处理器
    Yield,
}

/// 场景概要，`check` 子命令输出它。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Summary {
    /// 虚存配置
    pub config: VmConfig,
    /// 换页延迟
    pub latency: u64,
    /// 任务数
    pub tasks: usize,
    /// 上下文名，按定义顺序
    pub contexts: Vec<String>,
    /// 操作总数
    pub ops: usize,
    /// 终止计划数
    pub kills: usize,
}

impl FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

impl Scenario {
    /// 从文件读取场景。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        fs::read_to_string(path)?.parse()
    }

    /// 按场景得到虚存配置并检查。
    pub fn vm_config(&self) -> Result<VmConfig, SimError> {
        let default = VmConfig::default();
        let memory = &self.memory;
        let config = VmConfig {
            virtual_address_bits: memory
                .virtual_address_bits
                .unwrap_or(default.virtual_address_bits),
            page_address_bits: memory
                .page_address_bits
                .unwrap_or(default.page_address_bits),
            frames: memory.frames.unwrap_or(default.frames),
            policy: match &memory.policy {
                Some(name) => name.parse()?,
                None => default.policy,
            },
            frames_wanted: memory.frames_wanted.unwrap_or(default.frames_wanted),
        };
        config.validate()?;
        Ok(config)
    }

    /// 换页延迟，缺省为 1。
    #[inline]
    pub fn latency(&self) -> u64 {
        self.device.latency.unwrap_or(1)
    }

    /// 任务名。
    pub fn task_name(&self, i: usize) -> String {
        self.tasks
            .get(i)
            .and_then(|t| t.name.clone())
            .unwrap_or_else(|| format!("task{i}"))
    }

    /// 所有上下文的名字，按任务和定义顺序。
    pub fn context_names(&self) -> Vec<Vec<String>> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let task_name = self.task_name(i);
                task.contexts
                    .iter()
                    .enumerate()
                    .map(|(j, ctx)| {
                        ctx.name
                            .clone()
                            .unwrap_or_else(|| format!("{task_name}.{j}"))
                    })
                    .collect()
            })
            .collect()
    }

    /// 检查配置、上下文名和终止计划。
    pub fn check(&self) -> Result<Summary, SimError> {
        let config = self.vm_config()?;
        let contexts = self.context_names().concat();
        let mut seen = BTreeSet::new();
        for name in &contexts {
            if !seen.insert(name.as_str()) {
                return Err(SimError::DuplicateContext(name.clone()));
            }
        }
        if let Some(kill) = self.kills.iter().find(|k| !seen.contains(k.context.as_str())) {
            return Err(SimError::UnknownContext(kill.context.clone()));
        }
        Ok(Summary {
            config,
            latency: self.latency(),
            tasks: self.tasks.len(),
            ops: self
                .tasks
                .iter()
                .flat_map(|t| &t.contexts)
                .map(|c| c.ops.len())
                .sum(),
            contexts,
            kills: self.kills.len(),
        })
    }

    /// 用命令行参数覆盖场景。
    pub fn override_with(
        &mut self,
        policy: Option<PolicyKind>,
        frames: Option<usize>,
        frames_wanted: Option<usize>,
        latency: Option<u64>,
    ) {
        if let Some(policy) = policy {
            self.memory.policy = Some(policy.to_string());
        }
        if frames.is_some() {
            self.memory.frames = frames;
        }
        if frames_wanted.is_some() {
            self.memory.frames_wanted = frames_wanted;
        }
        if latency.is_some() {
            self.device.latency = latency;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesim_vm::ConfigError;

    const SAMPLE: &str = r#"
[memory]
frames = 4
policy = "fifo"

[device]
latency = 3

[[task]]
name = "a"
[[task.context]]
ops = [{ write = { addr = 0x400, value = 7 } }, "yield", { read = 0x400 }]
[[task.context]]
name = "reader"
ops = [{ lock = 0 }, { unlock = 0 }]

[[task]]
[[task.context]]

[[kill]]
context = "a.0"
at = 10
"#;

    #[test]
    fn parse_sample() {
        let scenario: Scenario = SAMPLE.parse().unwrap();
        assert_eq!(scenario.tasks.len(), 2);
        assert_eq!(
            scenario.tasks[0].contexts[0].ops,
            [
                Op::Write {
                    addr: 0x400,
                    value: 7
                },
                Op::Yield,
                Op::Read(0x400)
            ]
        );
        assert_eq!(scenario.tasks[0].contexts[1].ops, [Op::Lock(0), Op::Unlock(0)]);
        assert_eq!(
            scenario.context_names(),
            [vec!["a.0".to_string(), "reader".into()], vec!["task1.0".into()]]
        );

        let summary = scenario.check().unwrap();
        assert_eq!(summary.config.frames, 4);
        assert_eq!(summary.config.policy, PolicyKind::Fifo);
        assert_eq!(summary.config.page_address_bits, 6);
        assert_eq!(summary.latency, 3);
        assert_eq!(summary.ops, 5);
        assert_eq!(summary.kills, 1);
    }

    #[test]
    fn empty_scenario_uses_defaults() {
        let scenario: Scenario = "".parse().unwrap();
        assert_eq!(scenario.vm_config().unwrap(), VmConfig::default());
        assert_eq!(scenario.latency(), 1);
    }

    #[test]
    fn rejects_bad_references() {
        let mut scenario: Scenario = SAMPLE.parse().unwrap();
        scenario.kills[0].context = "nobody".into();
        assert!(matches!(
            scenario.check(),
            Err(SimError::UnknownContext(name)) if name == "nobody"
        ));

        let mut scenario: Scenario = SAMPLE.parse().unwrap();
        scenario.tasks[0].contexts[1].name = Some("a.0".into());
        assert!(matches!(scenario.check(), Err(SimError::DuplicateContext(_))));
    }

    #[test]
    fn rejects_bad_memory() {
        let mut scenario: Scenario = SAMPLE.parse().unwrap();
        scenario.memory.policy = Some("lru".into());
        assert!(matches!(
            scenario.vm_config(),
            Err(SimError::Config(ConfigError::UnknownPolicy))
        ));
        scenario.override_with(Some(PolicyKind::SecondChance), Some(2), Some(3), None);
        assert!(matches!(
            scenario.vm_config(),
            Err(SimError::Config(ConfigError::FramesWanted { wanted: 3, frames: 2 }))
        ));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            "[[task]]\nname = 3".parse::<Scenario>(),
            Err(SimError::Toml(_))
        ));
    }
}
