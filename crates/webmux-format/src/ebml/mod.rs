//! EBML (Extensible Binary Meta Language) 编解码.
//!
//! EBML 使用变长整数编码元素 ID 和数据大小.
//!
//! # 变长整数 (VINT)
//! ```text
//! 首字节的前导 1 位之前的 0 的数量决定了字节长度:
//!   1xxxxxxx                  → 1 字节 (7 位数据)
//!   01xxxxxx xxxxxxxx         → 2 字节 (14 位数据)
//!   001xxxxx xxxxxxxx ×2      → 3 字节 (21 位数据)
//!   ...依此类推, 最多 8 字节
//! ```
//!
//! 元素 ID 保留前导标记位; 数据大小掩掉标记位, 数据位全 1 表示"未知大小".

pub mod ids;
pub mod read;
pub mod write;

pub use read::{ElementHeader, Elements};
