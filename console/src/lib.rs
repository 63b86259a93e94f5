//! 提供 `print!`、`println!` 和 `log::Log`。

#![no_std]
#![deny(missing_docs)]

use core::{
    fmt::{self, Write},
    str::FromStr,
};
use spin::Once;

/// 向用户提供 `log`。
pub extern crate log;

/// 这个接口定义了向控制台“输出”这件事。
pub trait Console: Sync {
    /// 向控制台放置一个字符。
    fn put_char(&self, c: u8);

    /// 向控制台放置一个字符串。
    ///
    /// 如果使用了锁，覆盖这个实现以免反复获取和释放锁。
    #[inline]
    fn put_str(&self, s: &str) {
        for c in s.bytes() {
            self.put_char(c);
        }
    }

    /// 日志是否带颜色。输出不是终端时应当关掉。
    #[inline]
    fn colored(&self) -> bool {
        true
    }
}

/// 库找到输出的方法：保存一个对象引用，这是一种单例。
static CONSOLE: Once<&'static dyn Console> = Once::new();

/// 用户调用这个函数设置输出的方法。
///
/// 只有第一次调用生效；如果已经有别的 logger，返回错误。
pub fn init_console(console: &'static dyn Console) -> Result<(), log::SetLoggerError> {
    CONSOLE.call_once(|| console);
    log::set_logger(&Logger)
}

/// 根据字符串设置日志级别，无法识别时用 `Info`。
pub fn set_log_level(env: Option<&str>) {
    use log::LevelFilter as Lv;
    log::set_max_level(env.and_then(|s| Lv::from_str(s).ok()).unwrap_or(Lv::Info));
}

/// 打印。
///
/// 给宏用的，用户不会直接调它。
#[doc(hidden)]
#[inline]
pub fn _print(args: fmt::Arguments) {
    let _ = Logger.write_fmt(args);
}

/// 格式化打印。
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::_print(core::format_args!($($arg)*));
    }
}

/// 格式化打印并换行。
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::_print(core::format_args!($($arg)*));
        $crate::println!();
    }}
}

/// 这个 Unit struct 是 `core::fmt` 要求的。
struct Logger;

/// 实现 [`Write`] trait，格式化的基础。
///
/// 还没有注册控制台时，输出被丢弃。
impl Write for Logger {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result<(), fmt::Error> {
        if let Some(console) = CONSOLE.get() {
            console.put_str(s);
        }
        Ok(())
    }
}

/// 实现 `log::Log` trait，提供分级日志。
///
/// `Debug` 及以下级别附带日志来源模块，便于区分缺页处理和模拟器自身的输出。
impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        use log::Level::*;
        let level = record.level();
        let colored = CONSOLE.get().map_or(false, |c| c.colored());
        let color_code: u8 = match level {
            Error => 31,
            Warn => 93,
            Info => 34,
            Debug => 32,
            Trace => 90,
        };
        match (colored, level >= Debug) {
            (true, true) => println!(
                "\x1b[{color_code}m[{level:>5}] {}: {}\x1b[0m",
                record.target(),
                record.args(),
            ),
            (true, false) => println!("\x1b[{color_code}m[{level:>5}] {}\x1b[0m", record.args()),
            (false, true) => println!("[{level:>5}] {}: {}", record.target(), record.args()),
            (false, false) => println!("[{level:>5}] {}", record.args()),
        }
    }

    fn flush(&self) {}
}
