use thiserror::Error;

use crate::cartridge::RtcSnapshot;

const MAGIC: &[u8; 4] = b"DMGS";
const VERSION: u8 = 1;

// Flag bits of the serialized RTC control field.
const RTC_FLAG_DAY_HIGH: u8 = 0x01;
const RTC_FLAG_HALT: u8 = 0x40;
const RTC_FLAG_CARRY: u8 = 0x80;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("payload does not start with the save-state magic")]
    BadMagic,
    #[error("unsupported save-state version {0}")]
    UnsupportedVersion(u8),
    #[error("payload truncated")]
    Truncated,
    #[error("payload has {0} trailing bytes")]
    TrailingData(usize),
    #[error("payload RAM size {found} does not match cartridge RAM size {expected}")]
    RamSizeMismatch { expected: usize, found: usize },
    #[error("payload was saved for \"{found}\", loaded cartridge is \"{expected}\"")]
    TitleMismatch { expected: String, found: String },
    #[error("payload carries RTC state but the cartridge has no RTC")]
    UnexpectedRtc,
    #[error("cartridge has an RTC but the payload carries none")]
    MissingRtc,
}

/// Owned snapshot of everything that persists across sessions: the
/// cartridge's display title, its external RAM, and (for RTC-bearing
/// cartridges) the full clock state.
///
/// The snapshot aliases nothing inside the machine, so a host may hand it to
/// a background persistence worker while emulation keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveState {
    pub title: String,
    pub ram: Vec<u8>,
    pub rtc: Option<RtcSnapshot>,
}

impl SaveState {
    /// Serialize to the versioned little-endian wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 2 + self.title.len() + 4 + self.ram.len() + 10);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);

        let title = self.title.as_bytes();
        out.push(title.len().min(255) as u8);
        out.extend_from_slice(&title[..title.len().min(255)]);

        out.extend_from_slice(&(self.ram.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.ram);

        match &self.rtc {
            None => out.push(0),
            Some(rtc) => {
                out.push(1);
                out.push(rtc.seconds);
                out.push(rtc.minutes);
                out.push(rtc.hours);
                out.push(rtc.day_low);
                let mut flags = 0u8;
                if rtc.day_high {
                    flags |= RTC_FLAG_DAY_HIGH;
                }
                if rtc.halt {
                    flags |= RTC_FLAG_HALT;
                }
                if rtc.carry {
                    flags |= RTC_FLAG_CARRY;
                }
                out.push(flags);
                out.extend_from_slice(&rtc.subsecond_cycles.to_le_bytes());
            }
        }
        out
    }

    /// Decode a payload, rejecting anything malformed rather than truncating
    /// or misinterpreting bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SaveStateError> {
        let mut r = Reader { data, pos: 0 };

        if r.take(4)? != MAGIC {
            return Err(SaveStateError::BadMagic);
        }
        let version = r.u8()?;
        if version != VERSION {
            return Err(SaveStateError::UnsupportedVersion(version));
        }

        let title_len = r.u8()? as usize;
        let title = String::from_utf8_lossy(r.take(title_len)?).into_owned();

        let ram_len = r.u32()? as usize;
        let ram = r.take(ram_len)?.to_vec();

        let rtc = match r.u8()? {
            0 => None,
            _ => {
                let seconds = r.u8()?;
                let minutes = r.u8()?;
                let hours = r.u8()?;
                let day_low = r.u8()?;
                let flags = r.u8()?;
                let subsecond_cycles = r.u32()?;
                Some(RtcSnapshot {
                    seconds,
                    minutes,
                    hours,
                    day_low,
                    day_high: flags & RTC_FLAG_DAY_HIGH != 0,
                    halt: flags & RTC_FLAG_HALT != 0,
                    carry: flags & RTC_FLAG_CARRY != 0,
                    subsecond_cycles,
                })
            }
        };

        if r.pos != data.len() {
            return Err(SaveStateError::TrailingData(data.len() - r.pos));
        }

        Ok(Self { title, ram, rtc })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SaveStateError> {
        let end = self.pos.checked_add(n).ok_or(SaveStateError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(SaveStateError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SaveStateError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SaveStateError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
