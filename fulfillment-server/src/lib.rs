//! Poster Fulfillment Server - 海报打印订单履约服务
//!
//! # 架构概述
//!
//! 本模块是履约服务的主入口，提供以下核心功能：
//!
//! - **订单编排** (`orders`): 状态机、幂等事件账本、打印提交重试
//! - **数据库** (`orders::storage`): 嵌入式 redb 存储
//! - **Webhook 接入** (`webhook`): 签名校验与事件标准化
//! - **外部协作方** (`services`): 支付网关、打印合作方、邮件
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! fulfillment-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── utils/         # 错误、日志、输入校验
//! ├── pricing/       # 价格表 (纯函数)
//! ├── orders/        # 订单状态机 + 编排器 + 存储
//! ├── webhook/       # Webhook 签名校验与解码
//! ├── services/      # 外部协作方客户端
//! ├── notify/        # 通知派发 (best-effort)
//! └── api/           # HTTP 路由和处理器
//! ```

pub mod api;
pub mod core;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod services;
pub mod utils;
pub mod webhook;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use orders::{Orchestrator, OrderStorage};
pub use utils::{AppError, AppResponse, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    ____             __
   / __ \____  _____/ /____  _____
  / /_/ / __ \/ ___/ __/ _ \/ ___/
 / ____/ /_/ (__  ) /_/  __/ /
/_/    \____/____/\__/\___/_/
    "#
    );
}
