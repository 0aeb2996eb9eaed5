//! Wide-oriented stream I/O (`fgetwc`, `fputwc`, `ungetwc`, `fgetws`,
//! `fputws`).
//!
//! Wide characters travel through the byte buffer encoded in the locale
//! that was current when the stream became wide-oriented. A character that
//! straddles a buffer refill is carried in the stream's conversion state.

use super::error::StdioError;
use super::file::{Orientation, StdioStream};
use crate::wchar::{Decoded, MB_LEN_MAX, decode_one, encode_one};

impl StdioStream {
    /// `fgetwc`: `Ok(None)` at end of input.
    ///
    /// An invalid sequence, or end of input inside a character, fails with
    /// [`StdioError::IllegalSequence`] and latches the error indicator.
    pub fn getwc(&mut self) -> Result<Option<u32>, StdioError> {
        self.claim(Orientation::Wide)?;
        let encoding = self.encoding();
        loop {
            let Some(b) = self.next_byte()? else {
                if self.mb_state().is_initial() {
                    return Ok(None);
                }
                self.mb_state_mut().reset();
                return Err(self.fail(StdioError::IllegalSequence, true));
            };
            match decode_one(&[b], self.mb_state_mut(), encoding) {
                Decoded::Char { wc, .. } => return Ok(Some(wc)),
                Decoded::Incomplete { .. } | Decoded::EndOfInput => continue,
                Decoded::Invalid => return Err(self.fail(StdioError::IllegalSequence, true)),
            }
        }
    }

    /// `fputwc`.
    pub fn putwc(&mut self, wc: u32) -> Result<(), StdioError> {
        self.claim(Orientation::Wide)?;
        let mut bytes = [0u8; MB_LEN_MAX];
        let encoding = self.encoding();
        let n = encode_one(wc, self.mb_state_mut(), encoding, &mut bytes)
            .map_err(|_| self.fail(StdioError::IllegalSequence, true))?;
        self.write_bytes(&bytes[..n]).map_err(|short| short.error)
    }

    /// `ungetwc`: push back the encoded form of `wc`; clears EOF.
    pub fn ungetwc(&mut self, wc: u32) -> Result<(), StdioError> {
        self.claim(Orientation::Wide)?;
        let mut bytes = [0u8; MB_LEN_MAX];
        let encoding = self.encoding();
        let mut scratch = crate::wchar::MbState::new();
        let n = encode_one(wc, &mut scratch, encoding, &mut bytes)
            .map_err(|_| self.fail(StdioError::IllegalSequence, false))?;
        self.push_back(&bytes[..n])
    }

    /// Look at the next wide character without consuming it.
    pub(crate) fn peek_wc(&mut self) -> Result<Option<u32>, StdioError> {
        let Some(wc) = self.getwc()? else {
            return Ok(None);
        };
        self.ungetwc(wc)?;
        Ok(Some(wc))
    }

    /// `fgetws`: read at most `out.len() - 1` wide characters, stopping after
    /// a newline, and terminate with L'\0'. `None` if nothing was read
    /// before end of input, or on error.
    pub fn getws(&mut self, out: &mut [u32]) -> Option<usize> {
        let limit = out.len().checked_sub(1)?;
        let mut k = 0;
        while k < limit {
            match self.getwc() {
                Ok(Some(wc)) => {
                    out[k] = wc;
                    k += 1;
                    if wc == u32::from(b'\n') {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => return None,
            }
        }
        out[k] = 0;
        if k == 0 && limit > 0 { None } else { Some(k) }
    }

    /// `fputws`: returns the number of wide characters written.
    pub fn putws(&mut self, s: &[u32]) -> Result<usize, StdioError> {
        for &wc in s {
            self.putwc(wc)?;
        }
        Ok(s.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::errno;
    use crate::locale::Encoding;
    use crate::stdio::backend::PipeBackend;
    use crate::stdio::buffer::BufMode;
    use crate::stdio::error::StdioError;
    use crate::stdio::file::{Orientation, StdioStream, parse_mode};

    fn wide_reader(input: &[u8], buf: usize) -> StdioStream {
        let flags = parse_mode(b"r").unwrap();
        StdioStream::with_buffer_size(Box::new(PipeBackend::new(input)), flags, BufMode::Full, Some(buf))
            .unwrap()
    }

    #[test]
    fn getwc_decodes_across_refills() {
        let text = "añ€😀";
        let mut s = wide_reader(text.as_bytes(), 2);
        if s.fwide(1) > 0 && s.encoding() == Encoding::Utf8 {
            let mut got = Vec::new();
            while let Ok(Some(wc)) = s.getwc() {
                got.push(wc);
            }
            let want: Vec<u32> = text.chars().map(u32::from).collect();
            assert_eq!(got, want);
            assert!(s.is_eof());
        }
    }

    #[test]
    fn getwc_rejects_truncated_sequence() {
        let mut s = wide_reader(&[b'a', 0xE2, 0x82], 8);
        s.fwide(1);
        if s.encoding() == Encoding::Utf8 {
            assert_eq!(s.getwc(), Ok(Some(u32::from('a'))));
            assert_eq!(s.getwc(), Err(StdioError::IllegalSequence));
            assert!(s.is_error());
            assert_eq!(errno::get_errno(), errno::EILSEQ);
        }
    }

    #[test]
    fn byte_ops_fail_on_wide_stream() {
        let mut s = wide_reader(b"xyz", 8);
        assert_eq!(s.getwc(), Ok(Some(u32::from('x'))));
        assert_eq!(s.orientation(), Orientation::Wide);
        assert_eq!(s.getc(), Err(StdioError::Orientation));
        assert!(s.is_error());
        assert_eq!(s.fwide(-1), 1);
    }

    #[test]
    fn wide_ops_fail_on_byte_stream() {
        let mut s = wide_reader(b"xyz", 8);
        assert_eq!(s.getc(), Ok(Some(b'x')));
        assert_eq!(s.getwc(), Err(StdioError::Orientation));
        assert_eq!(s.putwc(u32::from('q')), Err(StdioError::Orientation));
    }

    #[test]
    fn ungetwc_pushes_encoded_form() {
        let mut s = wide_reader(b"b", 8);
        s.fwide(1);
        let euro = u32::from('€');
        if s.encoding() == Encoding::Utf8 {
            s.ungetwc(euro).unwrap();
            assert_eq!(s.getwc(), Ok(Some(euro)));
            assert_eq!(s.getwc(), Ok(Some(u32::from('b'))));
        }
    }

    #[test]
    fn putws_and_getws() {
        let pipe = PipeBackend::new(b"line one\nline two");
        let out = pipe.output();
        let flags = parse_mode(b"r+").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::None).unwrap();
        let mut line = [0u32; 32];
        assert_eq!(s.getws(&mut line), Some(9));
        assert_eq!(line[8], u32::from('\n'));
        assert_eq!(line[9], 0);
        let text: Vec<u32> = "ok".chars().map(u32::from).collect();
        assert_eq!(s.putws(&text), Ok(2));
        assert_eq!(out.lock().as_slice(), b"ok");
    }
}
