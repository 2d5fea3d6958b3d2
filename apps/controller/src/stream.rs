//! TCP 字节流分帧
//!
//! TCP 不保留消息边界。按方向魔数重新同步，再按包类型的固定帧长切出完整帧。
//! 候选帧只有在 CRC 通过时才被接受；类型未知、CRC 失败，或在其跨度内已出现
//! 另一个完整有效帧时，候选帧被拒绝，只丢弃到下一个魔数为止的字节。

use segment_protocol::{CommandType, MAGIC_COMMAND, TRAJECTORY_SIZE, crc16_verify};

/// 缓冲区上限（超过时丢弃最旧的数据）
const MAX_BUFFERED: usize = TRAJECTORY_SIZE * 8;

const MAGIC: [u8; 2] = MAGIC_COMMAND.to_le_bytes();

/// 分帧结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// CRC 通过、长度与类型一致的帧
    Frame(Vec<u8>),
    /// 被拒绝的候选帧字节（交给调度器记录错误）
    Rejected(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    /// 重新同步时丢弃的字节数
    discarded: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_BUFFERED {
            let excess = self.buf.len() - MAX_BUFFERED;
            self.buf.drain(..excess);
            self.discarded += excess;
        }
    }

    /// 取出下一个帧或被拒绝的片段；数据不足时返回 None
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        if !self.sync() || self.buf.len() < 3 {
            return None;
        }

        let Ok(command) = CommandType::try_from(self.buf[2]) else {
            return Some(self.reject());
        };
        let size = command.frame_size();

        if self.buf.len() >= size {
            if crc16_verify(&self.buf[..size]) {
                return Some(Chunk::Frame(self.buf.drain(..size).collect()));
            }
            return Some(self.reject());
        }

        // 帧头可能已损坏：后续的有效帧不能被它挡住
        if self.valid_frame_within(size) {
            return Some(self.reject());
        }
        None
    }

    /// 返回并清零丢弃计数
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// 把缓冲区对齐到魔数；缓冲区以魔数开头时返回 true
    fn sync(&mut self) -> bool {
        match self.buf.windows(2).position(|w| w == MAGIC) {
            Some(0) => true,
            Some(offset) => {
                self.buf.drain(..offset);
                self.discarded += offset;
                true
            },
            None => {
                let drop = self.buf.len() - self.trailing_half_magic();
                self.buf.drain(..drop);
                self.discarded += drop;
                false
            },
        }
    }

    /// 末尾字节可能是魔数的前半部分
    fn trailing_half_magic(&self) -> usize {
        usize::from(self.buf.last() == Some(&MAGIC[0]))
    }

    /// 下一个魔数的位置（跳过开头的魔数）
    fn next_magic(&self) -> Option<usize> {
        self.buf
            .windows(2)
            .skip(1)
            .position(|w| w == MAGIC)
            .map(|p| p + 1)
    }

    /// 拒绝当前候选：丢弃到下一个魔数为止
    fn reject(&mut self) -> Chunk {
        let end = self
            .next_magic()
            .unwrap_or_else(|| self.buf.len() - self.trailing_half_magic());
        Chunk::Rejected(self.buf.drain(..end).collect())
    }

    /// 当前候选的跨度内是否起始了另一个完整且 CRC 通过的帧
    fn valid_frame_within(&self, span: usize) -> bool {
        let limit = span.min(self.buf.len());
        (1..limit).any(|start| {
            let rest = &self.buf[start..];
            if rest.len() < 3 || rest[..2] != MAGIC {
                return false;
            }
            match CommandType::try_from(rest[2]) {
                Ok(command) => {
                    let size = command.frame_size();
                    rest.len() >= size && crc16_verify(&rest[..size])
                },
                Err(_) => false,
            }
        })
    }
}
