/// CRC-8 with polynomial 0x07 (the ATM / SMBus variant), processed MSB first.
pub(crate) fn crc8_update(crc: u8, data: u8) -> u8 {
    let mut crc = crc ^ data;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ 0x07
        } else {
            crc << 1
        };
    }
    crc
}

/// CRC-8 of a whole slice, seeded with zero.
pub(crate) fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &b| crc8_update(crc, b))
}
