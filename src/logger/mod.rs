use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write;
use std::sync::Mutex;

/// 终端日志输出，标签带颜色，写到 stderr 以免混入结果输出
pub struct Logger {
    use_colors: bool,
    max_level: LevelFilter,
    mutex: Mutex<()>,
}

impl Logger {
    /// 创建日志器
    pub fn new(max_level: LevelFilter, use_colors: bool) -> Self {
        Logger {
            use_colors,
            max_level,
            mutex: Mutex::new(()),
        }
    }

    fn label(level: Level) -> &'static str {
        match level {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn wrap(&self, level: Level) -> String {
        let label = Self::label(level);
        if !self.use_colors {
            return label.to_string();
        }

        match level {
            Level::Error => label.red().to_string(),
            Level::Warn => label.yellow().to_string(),
            Level::Info => label.blue().to_string(),
            Level::Debug => label.magenta().to_string(),
            Level::Trace => label.normal().to_string(),
        }
    }

    /// 格式化一条日志
    pub fn format(&self, record: &Record) -> String {
        format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            self.wrap(record.level()),
            record.args()
        )
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = self.format(record);
        let _guard = self.mutex.lock();
        let _ = writeln!(std::io::stderr(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// 安装全局日志器
pub fn init_logger(max_level: LevelFilter, use_colors: bool) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger::new(max_level, use_colors)))?;
    log::set_max_level(max_level);
    Ok(())
}
