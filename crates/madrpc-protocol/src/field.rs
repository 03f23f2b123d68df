//! Named bit fields of the management datagram.
//!
//! Offsets are counted in bits from the most significant bit of the first
//! byte of the component, as in the InfiniBand layout tables. Every accessor
//! takes a byte `base` so the same table can address the common header
//! (`base = 0`) or a payload component such as ClassPortInfo (`base = 64`).

use byteorder::{BigEndian, ByteOrder};

/// Location of a field inside its component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Offset of the first bit.
    pub bit_offset: usize,
    /// Width in bits (1..=64).
    pub bit_len: usize,
}

impl FieldDef {
    const fn new(bit_offset: usize, bit_len: usize) -> Self {
        Self { bit_offset, bit_len }
    }
}

/// Fields read or written by the codec and the orchestrators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MadField {
    // Common MAD header
    /// Base version.
    BaseVersion,
    /// Management class.
    MgmtClass,
    /// Class version.
    ClassVersion,
    /// Method, including the response bit.
    Method,
    /// Full 16-bit status.
    Status,
    /// Directed-route status (status without the direction bit).
    DrsmpStatus,
    /// 64-bit transaction identifier.
    Tid,
    /// Attribute identifier.
    AttrId,
    /// Attribute modifier.
    AttrMod,
    /// SMP management key.
    Mkey,

    // RMPP header
    /// RMPP version.
    RmppVersion,
    /// RMPP type.
    RmppType,
    /// RMPP response time.
    RmppRespTime,
    /// RMPP flags; bits 0-1 are active and first-segment.
    RmppFlags,
    /// RMPP status.
    RmppStatus,
    /// First RMPP data word (segment number).
    RmppD1,
    /// Second RMPP data word (payload length or new window).
    RmppD2,

    // Subnet administration header
    /// Attribute offset, in 8-byte words, of each record in a response.
    SaAttrOffset,
    /// Component mask.
    SaComponentMask,

    // ClassPortInfo, relative to the data area at byte 64
    /// Redirect service level.
    CpiRedirectSl,
    /// Redirect LID; zero means GID-based redirection.
    CpiRedirectLid,
    /// Redirect queue pair.
    CpiRedirectQp,
    /// Redirect queue key.
    CpiRedirectQkey,
}

impl MadField {
    /// Bit location of this field.
    pub const fn def(self) -> FieldDef {
        match self {
            MadField::BaseVersion => FieldDef::new(0, 8),
            MadField::MgmtClass => FieldDef::new(8, 8),
            MadField::ClassVersion => FieldDef::new(16, 8),
            MadField::Method => FieldDef::new(24, 8),
            MadField::Status => FieldDef::new(32, 16),
            MadField::DrsmpStatus => FieldDef::new(33, 15),
            MadField::Tid => FieldDef::new(64, 64),
            MadField::AttrId => FieldDef::new(128, 16),
            MadField::AttrMod => FieldDef::new(160, 32),
            MadField::Mkey => FieldDef::new(192, 64),

            MadField::RmppVersion => FieldDef::new(192, 8),
            MadField::RmppType => FieldDef::new(200, 8),
            MadField::RmppRespTime => FieldDef::new(208, 5),
            MadField::RmppFlags => FieldDef::new(213, 3),
            MadField::RmppStatus => FieldDef::new(216, 8),
            MadField::RmppD1 => FieldDef::new(224, 32),
            MadField::RmppD2 => FieldDef::new(256, 32),

            MadField::SaAttrOffset => FieldDef::new(352, 16),
            MadField::SaComponentMask => FieldDef::new(384, 64),

            MadField::CpiRedirectSl => FieldDef::new(200, 4),
            MadField::CpiRedirectLid => FieldDef::new(224, 16),
            MadField::CpiRedirectQp => FieldDef::new(264, 24),
            MadField::CpiRedirectQkey => FieldDef::new(288, 32),
        }
    }
}

/// Byte offset of the class data area in a MAD (ClassPortInfo lives here).
pub const DATA_AREA_OFFSET: usize = 64;

/// Reads a field of up to 32 bits. Bytes past the end of `buf` read as zero.
pub fn get_field(buf: &[u8], base: usize, field: MadField) -> u32 {
    let def = field.def();
    debug_assert!(def.bit_len <= 32, "{:?} is wider than 32 bits", field);
    read_bits(buf, base * 8 + def.bit_offset, def.bit_len) as u32
}

/// Reads a field of up to 64 bits.
pub fn get_field64(buf: &[u8], base: usize, field: MadField) -> u64 {
    let def = field.def();
    read_bits(buf, base * 8 + def.bit_offset, def.bit_len)
}

/// Writes a field of up to 32 bits. Bits outside the field are preserved.
pub fn set_field(buf: &mut [u8], base: usize, field: MadField, value: u32) {
    let def = field.def();
    write_bits(buf, base * 8 + def.bit_offset, def.bit_len, u64::from(value));
}

/// Writes a field of up to 64 bits.
pub fn set_field64(buf: &mut [u8], base: usize, field: MadField, value: u64) {
    let def = field.def();
    write_bits(buf, base * 8 + def.bit_offset, def.bit_len, value);
}

/// Low 32 bits of the transaction identifier, the part compared when
/// matching a response to its request.
pub fn transaction_id(mad: &[u8]) -> u32 {
    get_field64(mad, 0, MadField::Tid) as u32
}

fn aligned(bit_offset: usize, bit_len: usize, buf_len: usize) -> bool {
    bit_offset % 8 == 0 && matches!(bit_len, 16 | 32 | 64) && bit_offset / 8 + bit_len / 8 <= buf_len
}

fn read_bits(buf: &[u8], bit_offset: usize, bit_len: usize) -> u64 {
    if aligned(bit_offset, bit_len, buf.len()) {
        let bytes = &buf[bit_offset / 8..];
        return match bit_len {
            16 => u64::from(BigEndian::read_u16(bytes)),
            32 => u64::from(BigEndian::read_u32(bytes)),
            _ => BigEndian::read_u64(bytes),
        };
    }

    let mut value = 0u64;
    for bit in bit_offset..bit_offset + bit_len {
        let byte = buf.get(bit / 8).copied().unwrap_or(0);
        value = (value << 1) | u64::from((byte >> (7 - bit % 8)) & 1);
    }
    value
}

fn write_bits(buf: &mut [u8], bit_offset: usize, bit_len: usize, value: u64) {
    if aligned(bit_offset, bit_len, buf.len()) {
        let bytes = &mut buf[bit_offset / 8..];
        match bit_len {
            16 => BigEndian::write_u16(bytes, value as u16),
            32 => BigEndian::write_u32(bytes, value as u32),
            _ => BigEndian::write_u64(bytes, value),
        }
        return;
    }

    for (i, bit) in (bit_offset..bit_offset + bit_len).enumerate() {
        let Some(byte) = buf.get_mut(bit / 8) else { return };
        let mask = 1u8 << (7 - bit % 8);
        if (value >> (bit_len - 1 - i)) & 1 == 1 {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}
