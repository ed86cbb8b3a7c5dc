use std::time::Duration;

/// 服务器配置 - 履约服务的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/poster/fulfillment | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP API 服务端口 |
/// | PAYMENT_WEBHOOK_SECRET | (必填) | 支付 webhook 共享密钥 |
/// | FULFILLMENT_WEBHOOK_SECRET | (必填) | 打印伙伴 webhook 共享密钥 |
/// | PAYMENT_GATEWAY_URL | http://localhost:4001 | 支付网关地址 |
/// | PAYMENT_GATEWAY_KEY | (空) | 支付网关 API key |
/// | PRINT_PARTNER_URL | http://localhost:4002 | 打印伙伴地址 |
/// | PRINT_PARTNER_KEY | (空) | 打印伙伴 API key |
/// | MAILER_URL | http://localhost:4003 | 邮件服务地址 |
/// | MAILER_KEY | (空) | 邮件服务 API key |
/// | MAIL_FROM | orders@posters.example | 发件人地址 |
/// | UPSTREAM_TIMEOUT_MS | 10000 | 对外 HTTP 超时(毫秒) |
/// | SUBMIT_MAX_ATTEMPTS | 5 | 打印提交最大尝试次数 |
/// | SUBMIT_BASE_DELAY_MS | 500 | 提交重试基础延迟(毫秒) |
/// | SUBMIT_DELAY_CAP_MS | 30000 | 提交重试延迟上限(毫秒) |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/fulfillment HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === Webhook 密钥 ===
    /// 支付 webhook 签名密钥
    pub payment_webhook_secret: String,
    /// 打印伙伴 webhook 签名密钥
    pub fulfillment_webhook_secret: String,

    // === 外部协作方 ===
    /// 支付网关 URL
    pub payment_gateway_url: String,
    /// 支付网关 API key
    pub payment_gateway_key: String,
    /// 打印伙伴 URL
    pub print_partner_url: String,
    /// 打印伙伴 API key
    pub print_partner_key: String,
    /// 邮件服务 URL
    pub mailer_url: String,
    /// 邮件服务 API key
    pub mailer_key: String,
    /// 发件人地址
    pub mail_from: String,
    /// 对外 HTTP 请求超时 (毫秒)
    pub upstream_timeout_ms: u64,

    // === 打印提交重试 ===
    /// 最大尝试次数（含首次）
    pub submit_max_attempts: u32,
    /// 重试基础延迟 (毫秒)
    pub submit_base_delay_ms: u64,
    /// 重试延迟上限 (毫秒)
    pub submit_delay_cap_ms: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值。webhook 密钥没有可用的
    /// 默认值：缺失时留空，启动校验会拒绝空密钥。
    pub fn from_env() -> Self {
        Self {
            work_dir: env_or("WORK_DIR", "/var/lib/poster/fulfillment"),
            http_port: env_parse("HTTP_PORT", 3000),
            environment: env_or("ENVIRONMENT", "development"),

            payment_webhook_secret: env_or("PAYMENT_WEBHOOK_SECRET", ""),
            fulfillment_webhook_secret: env_or("FULFILLMENT_WEBHOOK_SECRET", ""),

            payment_gateway_url: env_or("PAYMENT_GATEWAY_URL", "http://localhost:4001"),
            payment_gateway_key: env_or("PAYMENT_GATEWAY_KEY", ""),
            print_partner_url: env_or("PRINT_PARTNER_URL", "http://localhost:4002"),
            print_partner_key: env_or("PRINT_PARTNER_KEY", ""),
            mailer_url: env_or("MAILER_URL", "http://localhost:4003"),
            mailer_key: env_or("MAILER_KEY", ""),
            mail_from: env_or("MAIL_FROM", "orders@posters.example"),
            upstream_timeout_ms: env_parse("UPSTREAM_TIMEOUT_MS", 10_000),

            submit_max_attempts: env_parse("SUBMIT_MAX_ATTEMPTS", 5),
            submit_base_delay_ms: env_parse("SUBMIT_BASE_DELAY_MS", 500),
            submit_delay_cap_ms: env_parse("SUBMIT_DELAY_CAP_MS", 30_000),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 校验启动必需的配置项
    ///
    /// 没有密钥就没有可信的 webhook 来源，拒绝启动。
    pub fn validate(&self) -> Result<(), String> {
        if self.payment_webhook_secret.trim().is_empty() {
            return Err("PAYMENT_WEBHOOK_SECRET is required".into());
        }
        if self.fulfillment_webhook_secret.trim().is_empty() {
            return Err("FULFILLMENT_WEBHOOK_SECRET is required".into());
        }
        if self.submit_max_attempts == 0 {
            return Err("SUBMIT_MAX_ATTEMPTS must be at least 1".into());
        }
        Ok(())
    }

    /// 对外 HTTP 超时
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// 数据库文件路径
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.work_dir).join("fulfillment.redb")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
