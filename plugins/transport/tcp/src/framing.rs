use linker_api::BrokerError;

/// Накопитель байтов одного соединения, отдающий записи по строкам.
///
/// Пустые строки (и строки из одного `\r`) записями не считаются.
#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    /// До этой позиции `buf` уже просмотрен и не содержит `\n`.
    scanned: usize,
    max_length: usize,
}

impl LineSplitter {
    /// `max_length == 0`: без ограничения длины.
    pub fn new(max_length: usize) -> Self {
        Self { buf: Vec::with_capacity(8192), scanned: 0, max_length }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Следующая непустая запись без `\n`/`\r\n`, либо `None`, если
    /// полной строки в буфере пока нет.
    ///
    /// Ошибка: строка длиннее `max_length`; соединение дальше не читается.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>, BrokerError> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                if self.max_length > 0 && self.buf.len() > self.max_length {
                    return Err(self.too_long(self.buf.len()));
                }
                return Ok(None);
            };
            let end = self.scanned + offset;
            self.scanned = 0;

            let mut line: Vec<u8> = self.buf.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if self.max_length > 0 && line.len() > self.max_length {
                return Err(self.too_long(line.len()));
            }
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    /// Хвост без завершающего `\n`.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn too_long(&self, len: usize) -> BrokerError {
        BrokerError::Rejected(format!("line too long: {len} bytes (max {})", self.max_length))
    }
}
