//! 小端序字段编解码
//!
//! 磁盘上的所有整数都是小端序的 `u32`/`u64`。

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn u32(&mut self) -> u32 {
        let mut raw = [0; 4];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(raw)
    }

    pub fn u64(&mut self) -> u64 {
        let mut raw = [0; 8];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(raw)
    }
}

pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_le_bytes());
        self.pos += 4;
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&value.to_le_bytes());
        self.pos += 8;
        self
    }

    /// 剩余部分全部填0
    pub fn zero_rest(&mut self) {
        self.buf[self.pos..].fill(0);
        self.pos = self.buf.len();
    }
}
