//! Output report framing.
//!
//! Legacy (BMP) framing:
//! - Report size: 8191 bytes (16 header bytes + payload)
//! - Exactly two pages, split after the BMP header and the first 2583 pixels
//! - Header: 0x02 0x01 <page> 0x00 <last> <key> followed by zeros
//!
//! JPEG framing:
//! - Report size: 1024 bytes (8 header bytes + up to 1016 payload bytes)
//! - Header: 0x02 0x07 <key> <last> <len LE16> <page LE16>

use crate::codec::BMP_HEADER_SIZE;
use crate::profile::{DeviceProfile, ImageEncoding};
use crate::{Error, Result};

/// Legacy report size.
pub const BMP_REPORT_SIZE: usize = 8191;

/// Legacy report header size.
pub const BMP_HEADER_LEN: usize = 16;

/// Pixels carried by the first legacy page.
pub const BMP_FIRST_PAGE_PIXELS: usize = 2583;

/// Offset at which a legacy image is split into two pages.
pub const BMP_SPLIT_OFFSET: usize = BMP_HEADER_SIZE + BMP_FIRST_PAGE_PIXELS * 3;

/// JPEG report size.
pub const JPEG_REPORT_SIZE: usize = 1024;

/// JPEG report header size.
pub const JPEG_HEADER_LEN: usize = 8;

/// Largest payload of one JPEG report.
pub const JPEG_PAYLOAD_SIZE: usize = JPEG_REPORT_SIZE - JPEG_HEADER_LEN;

/// Output report ID.
const REPORT_ID: u8 = 0x02;

/// Legacy "set key image" command.
const BMP_COMMAND: u8 = 0x01;

/// Modern "set key image" command.
const JPEG_COMMAND: u8 = 0x07;

/// One fixed-size output report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Page number as written into the header.
    pub page: usize,
    /// Full report bytes including header and padding.
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Splits an encoded key image into output reports, in transmit order.
pub fn frame(profile: &DeviceProfile, button: usize, encoded: &[u8]) -> Result<Vec<Transaction>> {
    let key = profile.remap_key(button);
    match profile.image_encoding {
        ImageEncoding::RawBgr => frame_bmp(key, encoded),
        ImageEncoding::Jpeg => frame_jpeg(key, encoded),
    }
}

fn frame_bmp(key: usize, encoded: &[u8]) -> Result<Vec<Transaction>> {
    let capacity = BMP_REPORT_SIZE - BMP_HEADER_LEN;
    let split = BMP_SPLIT_OFFSET.min(encoded.len());
    let (first, second) = encoded.split_at(split);
    if second.len() > capacity {
        return Err(Error::ImageTooLarge {
            len: encoded.len(),
            max: split + capacity,
        });
    }

    let pages = [(1u8, first), (2u8, second)];
    Ok(pages
        .iter()
        .map(|&(page, payload)| {
            let mut data = vec![0u8; BMP_REPORT_SIZE];
            data[0] = REPORT_ID;
            data[1] = BMP_COMMAND;
            data[2] = page;
            data[4] = if page == 2 { 0x01 } else { 0x00 };
            data[5] = key as u8;
            data[BMP_HEADER_LEN..BMP_HEADER_LEN + payload.len()].copy_from_slice(payload);
            Transaction {
                page: page as usize,
                data,
            }
        })
        .collect())
}

fn frame_jpeg(key: usize, encoded: &[u8]) -> Result<Vec<Transaction>> {
    let page_count = encoded.len().div_ceil(JPEG_PAYLOAD_SIZE).max(1);
    if page_count > u16::MAX as usize + 1 {
        return Err(Error::ImageTooLarge {
            len: encoded.len(),
            max: (u16::MAX as usize + 1) * JPEG_PAYLOAD_SIZE,
        });
    }

    let mut transactions = Vec::with_capacity(page_count);
    for page in 0..page_count {
        let start = page * JPEG_PAYLOAD_SIZE;
        let end = (start + JPEG_PAYLOAD_SIZE).min(encoded.len());
        let chunk = &encoded[start..end];
        let last = page == page_count - 1;

        let mut data = vec![0u8; JPEG_REPORT_SIZE];
        data[0] = REPORT_ID;
        data[1] = JPEG_COMMAND;
        data[2] = key as u8;
        data[3] = last as u8;
        data[4..6].copy_from_slice(&(chunk.len() as u16).to_le_bytes());
        data[6..8].copy_from_slice(&(page as u16).to_le_bytes());
        data[JPEG_HEADER_LEN..JPEG_HEADER_LEN + chunk.len()].copy_from_slice(chunk);

        transactions.push(Transaction { page, data });
    }
    Ok(transactions)
}
