//! 局面キー（Zobristハッシュ）
//!
//! - `PositionKey`: 64bit の局面指紋
//! - `ZobristTable`: 固定シードで生成した乱数表（プロセス間で安定）
//! - `PositionHasher`: 全計算と差分更新
//! - `BoardDelta`: 2局面間の差分（差分更新の入力）
//!
//! 乱数表の値は保存済みスナップショットのキーそのものなので、シードや
//! 生成順を変えてはいけない。

mod delta;
mod zobrist;

pub use delta::{BoardDelta, SquareChange};
pub use zobrist::{PositionHasher, PositionKey, ZOBRIST, ZobristTable};
