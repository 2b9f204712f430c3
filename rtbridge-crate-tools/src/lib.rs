//! rtbridge 工具集
//!
//! 提供日志初始化等在各个 crate 之间共享的工具。

pub mod init_log;
