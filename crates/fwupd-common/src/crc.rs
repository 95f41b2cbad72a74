//! Named CRC-8, CRC-16 and CRC-32 parameter sets.
//!
//! Parameters follow the usual catalogue convention: the polynomial is given
//! without its top bit, `init` is the register value before reflection, and
//! `xorout` is applied after the optional output reflection.
//!
//! [`CrcKind::B32Standard`] is delegated to `crc32fast`; every other kind
//! uses the bitwise engine.

use core::fmt;
use core::str::FromStr;

use fwupd_errors::FwupdError;

/// A named CRC parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CrcKind {
    /// CRC-32/ISO-HDLC, as used by zlib and Ethernet
    B32Standard,
    /// CRC-32/BZIP2
    B32Bzip2,
    /// CRC-32/JAMCRC
    B32Jamcrc,
    /// CRC-32/MPEG-2
    B32Mpeg2,
    /// CRC-32/CKSUM
    B32Posix,
    /// CRC-32 as used by SATA
    B32Sata,
    /// CRC-32/XFER
    B32Xfer,
    /// CRC-32C (Castagnoli)
    B32C,
    /// CRC-32D
    B32D,
    /// CRC-32Q
    B32Q,
    /// CRC-16/XMODEM
    B16Xmodem,
    /// CRC-16/KERMIT
    B16Kermit,
    /// CRC-16/USB
    B16Usb,
    /// CRC-16/UMTS
    B16Umts,
    /// CRC-16/TMS37157
    B16Tms37157,
    /// CRC-16 as used by BNR DisplayPort receivers
    B16Bnr,
    /// CRC-8/WCDMA
    B8Wcdma,
    /// CRC-8/TECH-3250
    B8Tech3250,
    /// CRC-8 with inverted output, the historic default
    B8Standard,
    /// CRC-8/SAE-J1850
    B8SaeJ1850,
    /// CRC-8/ROHC
    B8Rohc,
    /// CRC-8/OPENSAFETY
    B8Opensafety,
    /// CRC-8/NRSC-5
    B8Nrsc5,
    /// CRC-8/MIFARE-MAD
    B8MifareMad,
    /// CRC-8/MAXIM-DOW
    B8MaximDow,
    /// CRC-8/LTE
    B8Lte,
    /// CRC-8/I-CODE
    B8ICode,
    /// CRC-8/I-432-1
    B8Itu,
    /// CRC-8/HITAG
    B8Hitag,
    /// CRC-8/GSM-B
    B8GsmB,
    /// CRC-8/GSM-A
    B8GsmA,
    /// CRC-8/DVB-S2
    B8DvbS2,
    /// CRC-8/DARC
    B8Darc,
    /// CRC-8/CDMA2000
    B8Cdma2000,
    /// CRC-8/BLUETOOTH
    B8Bluetooth,
    /// CRC-8/AUTOSAR
    B8Autosar,
}

#[derive(Debug, Clone, Copy)]
struct CrcParams {
    bitwidth: u32,
    poly: u32,
    init: u32,
    reflected: bool,
    xorout: u32,
}

const fn p(bitwidth: u32, poly: u32, init: u32, reflected: bool, xorout: u32) -> CrcParams {
    CrcParams {
        bitwidth,
        poly,
        init,
        reflected,
        xorout,
    }
}

impl CrcKind {
    /// Every supported kind, in catalogue order.
    pub const ALL: [CrcKind; 36] = [
        CrcKind::B32Standard,
        CrcKind::B32Bzip2,
        CrcKind::B32Jamcrc,
        CrcKind::B32Mpeg2,
        CrcKind::B32Posix,
        CrcKind::B32Sata,
        CrcKind::B32Xfer,
        CrcKind::B32C,
        CrcKind::B32D,
        CrcKind::B32Q,
        CrcKind::B16Xmodem,
        CrcKind::B16Kermit,
        CrcKind::B16Usb,
        CrcKind::B16Umts,
        CrcKind::B16Tms37157,
        CrcKind::B16Bnr,
        CrcKind::B8Wcdma,
        CrcKind::B8Tech3250,
        CrcKind::B8Standard,
        CrcKind::B8SaeJ1850,
        CrcKind::B8Rohc,
        CrcKind::B8Opensafety,
        CrcKind::B8Nrsc5,
        CrcKind::B8MifareMad,
        CrcKind::B8MaximDow,
        CrcKind::B8Lte,
        CrcKind::B8ICode,
        CrcKind::B8Itu,
        CrcKind::B8Hitag,
        CrcKind::B8GsmB,
        CrcKind::B8GsmA,
        CrcKind::B8DvbS2,
        CrcKind::B8Darc,
        CrcKind::B8Cdma2000,
        CrcKind::B8Bluetooth,
        CrcKind::B8Autosar,
    ];

    fn params(self) -> CrcParams {
        match self {
            CrcKind::B32Standard => p(32, 0x04C1_1DB7, 0xFFFF_FFFF, true, 0xFFFF_FFFF),
            CrcKind::B32Bzip2 => p(32, 0x04C1_1DB7, 0xFFFF_FFFF, false, 0xFFFF_FFFF),
            CrcKind::B32Jamcrc => p(32, 0x04C1_1DB7, 0xFFFF_FFFF, true, 0x0000_0000),
            CrcKind::B32Mpeg2 => p(32, 0x04C1_1DB7, 0xFFFF_FFFF, false, 0x0000_0000),
            CrcKind::B32Posix => p(32, 0x04C1_1DB7, 0x0000_0000, false, 0xFFFF_FFFF),
            CrcKind::B32Sata => p(32, 0x04C1_1DB7, 0x5232_5032, false, 0x0000_0000),
            CrcKind::B32Xfer => p(32, 0x0000_00AF, 0x0000_0000, false, 0x0000_0000),
            CrcKind::B32C => p(32, 0x1EDC_6F41, 0xFFFF_FFFF, true, 0xFFFF_FFFF),
            CrcKind::B32D => p(32, 0xA833_982B, 0xFFFF_FFFF, true, 0xFFFF_FFFF),
            CrcKind::B32Q => p(32, 0x8141_41AB, 0x0000_0000, false, 0x0000_0000),
            CrcKind::B16Xmodem => p(16, 0x1021, 0x0000, false, 0x0000),
            CrcKind::B16Kermit => p(16, 0x1021, 0x0000, true, 0x0000),
            CrcKind::B16Usb => p(16, 0x8005, 0xFFFF, true, 0xFFFF),
            CrcKind::B16Umts => p(16, 0x8005, 0x0000, false, 0x0000),
            CrcKind::B16Tms37157 => p(16, 0x1021, 0x89EC, true, 0x0000),
            CrcKind::B16Bnr => p(16, 0x8005, 0xFFFF, true, 0x0000),
            CrcKind::B8Wcdma => p(8, 0x9B, 0x00, true, 0x00),
            CrcKind::B8Tech3250 => p(8, 0x1D, 0xFF, true, 0x00),
            CrcKind::B8Standard => p(8, 0x07, 0x00, false, 0xFF),
            CrcKind::B8SaeJ1850 => p(8, 0x1D, 0xFF, false, 0xFF),
            CrcKind::B8Rohc => p(8, 0x07, 0xFF, true, 0x00),
            CrcKind::B8Opensafety => p(8, 0x2F, 0x00, false, 0x00),
            CrcKind::B8Nrsc5 => p(8, 0x31, 0xFF, false, 0x00),
            CrcKind::B8MifareMad => p(8, 0x1D, 0xC7, false, 0x00),
            CrcKind::B8MaximDow => p(8, 0x31, 0x00, true, 0x00),
            CrcKind::B8Lte => p(8, 0x9B, 0x00, false, 0x00),
            CrcKind::B8ICode => p(8, 0x1D, 0xFD, false, 0x00),
            CrcKind::B8Itu => p(8, 0x07, 0x00, false, 0x55),
            CrcKind::B8Hitag => p(8, 0x1D, 0xFF, false, 0x00),
            CrcKind::B8GsmB => p(8, 0x49, 0x00, false, 0xFF),
            CrcKind::B8GsmA => p(8, 0x1D, 0x00, false, 0x00),
            CrcKind::B8DvbS2 => p(8, 0xD5, 0x00, false, 0x00),
            CrcKind::B8Darc => p(8, 0x39, 0x00, true, 0x00),
            CrcKind::B8Cdma2000 => p(8, 0x9B, 0xFF, false, 0x00),
            CrcKind::B8Bluetooth => p(8, 0xA7, 0x00, true, 0x00),
            CrcKind::B8Autosar => p(8, 0x2F, 0xFF, false, 0xFF),
        }
    }

    /// Width of the checksum in bits: 8, 16 or 32.
    pub fn bitwidth(self) -> u32 {
        self.params().bitwidth
    }

    /// Stable name, e.g. `b32-standard`.
    pub fn as_str(self) -> &'static str {
        match self {
            CrcKind::B32Standard => "b32-standard",
            CrcKind::B32Bzip2 => "b32-bzip2",
            CrcKind::B32Jamcrc => "b32-jamcrc",
            CrcKind::B32Mpeg2 => "b32-mpeg2",
            CrcKind::B32Posix => "b32-posix",
            CrcKind::B32Sata => "b32-sata",
            CrcKind::B32Xfer => "b32-xfer",
            CrcKind::B32C => "b32-c",
            CrcKind::B32D => "b32-d",
            CrcKind::B32Q => "b32-q",
            CrcKind::B16Xmodem => "b16-xmodem",
            CrcKind::B16Kermit => "b16-kermit",
            CrcKind::B16Usb => "b16-usb",
            CrcKind::B16Umts => "b16-umts",
            CrcKind::B16Tms37157 => "b16-tms37157",
            CrcKind::B16Bnr => "b16-bnr",
            CrcKind::B8Wcdma => "b8-wcdma",
            CrcKind::B8Tech3250 => "b8-tech-3250",
            CrcKind::B8Standard => "b8-standard",
            CrcKind::B8SaeJ1850 => "b8-sae-j1850",
            CrcKind::B8Rohc => "b8-rohc",
            CrcKind::B8Opensafety => "b8-opensafety",
            CrcKind::B8Nrsc5 => "b8-nrsc-5",
            CrcKind::B8MifareMad => "b8-mifare-mad",
            CrcKind::B8MaximDow => "b8-maxim-dow",
            CrcKind::B8Lte => "b8-lte",
            CrcKind::B8ICode => "b8-i-code",
            CrcKind::B8Itu => "b8-itu",
            CrcKind::B8Hitag => "b8-hitag",
            CrcKind::B8GsmB => "b8-gsm-b",
            CrcKind::B8GsmA => "b8-gsm-a",
            CrcKind::B8DvbS2 => "b8-dvb-s2",
            CrcKind::B8Darc => "b8-darc",
            CrcKind::B8Cdma2000 => "b8-cdma2000",
            CrcKind::B8Bluetooth => "b8-bluetooth",
            CrcKind::B8Autosar => "b8-autosar",
        }
    }
}

impl fmt::Display for CrcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrcKind {
    type Err = FwupdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrcKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| FwupdError::not_supported(format!("CRC kind {s} not supported")))
    }
}

fn reflect(value: u32, bitwidth: u32) -> u32 {
    value.reverse_bits() >> (32 - bitwidth)
}

#[derive(Debug, Clone)]
enum Engine {
    Fast(crc32fast::Hasher),
    Bitwise { params: CrcParams, reg: u32 },
}

/// Incremental CRC calculation.
///
/// ```
/// use fwupd_common::{Crc, CrcKind};
///
/// let mut crc = Crc::new(CrcKind::B16Usb);
/// crc.update(&[0x01, 0x02, 0x03, 0x04]);
/// crc.update(&[0x05, 0x06, 0x07, 0x08, 0x09]);
/// assert_eq!(crc.finish(), 0x4DF1);
/// ```
#[derive(Debug, Clone)]
pub struct Crc {
    engine: Engine,
}

impl Crc {
    /// Start a new calculation.
    pub fn new(kind: CrcKind) -> Self {
        let engine = match kind {
            CrcKind::B32Standard => Engine::Fast(crc32fast::Hasher::new()),
            other => {
                let params = other.params();
                Engine::Bitwise {
                    params,
                    reg: params.init,
                }
            }
        };
        Self { engine }
    }

    /// Feed more data.
    pub fn update(&mut self, buf: &[u8]) {
        match &mut self.engine {
            Engine::Fast(hasher) => hasher.update(buf),
            Engine::Bitwise { params, reg } => {
                let topbit = 1u32 << (params.bitwidth - 1);
                let mask = if params.bitwidth == 32 {
                    u32::MAX
                } else {
                    (1u32 << params.bitwidth) - 1
                };
                for &b in buf {
                    let b = if params.reflected { b.reverse_bits() } else { b };
                    *reg ^= u32::from(b) << (params.bitwidth - 8);
                    for _ in 0..8 {
                        let shifted = if *reg & topbit != 0 {
                            (*reg << 1) ^ params.poly
                        } else {
                            *reg << 1
                        };
                        *reg = shifted & mask;
                    }
                }
            }
        }
    }

    /// Return the checksum, widened to `u32`.
    pub fn finish(self) -> u32 {
        match self.engine {
            Engine::Fast(hasher) => hasher.finalize(),
            Engine::Bitwise { params, reg } => {
                let reg = if params.reflected {
                    reflect(reg, params.bitwidth)
                } else {
                    reg
                };
                reg ^ params.xorout
            }
        }
    }
}

/// One-shot CRC of `buf`, widened to `u32`.
pub fn crc(kind: CrcKind, buf: &[u8]) -> u32 {
    let mut crc = Crc::new(kind);
    crc.update(buf);
    crc.finish()
}

/// One-shot CRC-8 of `buf`.
///
/// # Panics
///
/// Panics if `kind` is not an 8-bit kind.
pub fn crc8(kind: CrcKind, buf: &[u8]) -> u8 {
    assert_eq!(kind.bitwidth(), 8, "{kind} is not an 8-bit CRC");
    crc(kind, buf).to_le_bytes()[0]
}

/// One-shot CRC-16 of `buf`.
///
/// # Panics
///
/// Panics if `kind` is not a 16-bit kind.
pub fn crc16(kind: CrcKind, buf: &[u8]) -> u16 {
    assert_eq!(kind.bitwidth(), 16, "{kind} is not a 16-bit CRC");
    let b = crc(kind, buf).to_le_bytes();
    u16::from_le_bytes([b[0], b[1]])
}

/// One-shot CRC-32 of `buf`.
///
/// # Panics
///
/// Panics if `kind` is not a 32-bit kind.
pub fn crc32(kind: CrcKind, buf: &[u8]) -> u32 {
    assert_eq!(kind.bitwidth(), 32, "{kind} is not a 32-bit CRC");
    crc(kind, buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        for kind in CrcKind::ALL {
            assert_eq!(kind.as_str().parse::<CrcKind>()?, kind);
        }
        assert!("b64-nope".parse::<CrcKind>().is_err());
        Ok(())
    }

    #[test]
    fn test_fast_path_matches_bitwise() {
        let data: Vec<u8> = (0u8..=255).collect();
        let params = CrcKind::B32Standard.params();
        let mut slow = Crc {
            engine: Engine::Bitwise {
                params,
                reg: params.init,
            },
        };
        slow.update(&data);
        assert_eq!(slow.finish(), crc(CrcKind::B32Standard, &data));
    }

    #[test]
    fn test_empty_input_is_init_transform() {
        assert_eq!(crc(CrcKind::B32Standard, &[]), 0);
        assert_eq!(crc(CrcKind::B16Xmodem, &[]), 0);
        assert_eq!(crc(CrcKind::B8Standard, &[]), 0xFF);
    }

    #[test]
    #[should_panic(expected = "is not an 8-bit CRC")]
    fn test_wrong_width_panics() {
        crc8(CrcKind::B16Usb, b"x");
    }
}
