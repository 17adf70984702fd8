//! P-DATA fragmentation, Part 8 §9.3.5.

use std::io::Write;

use bytes::BytesMut;

use crate::pdu::{write_pdu, PDataTf, Pdu, PresentationDataValue};

/// A P-Data value writer.
///
/// This exposes an API to iteratively construct and send Data messages
/// to another node. Using this as a [standard writer](std::io::Write)
/// will automatically split the incoming bytes into separate P-DATA-TF
/// PDUs if they do not fit in a single one.
///
/// Use an association's `send_pdata` method to create a new P-Data
/// value writer.
#[must_use]
pub struct PDataWriter<W: Write> {
    buffer: BytesMut,
    stream: W,
    presentation_context_id: u8,
    is_command: bool,
    max_data_length: u32,
}

impl<W> PDataWriter<W>
where
    W: Write,
{
    /// Construct a new P-Data value writer.
    pub(crate) fn new(
        stream: W,
        presentation_context_id: u8,
        is_command: bool,
        max_pdu_length: u32,
    ) -> Self {
        let max_data_length = calculate_max_data_len_single(max_pdu_length);
        PDataWriter {
            stream,
            presentation_context_id,
            is_command,
            max_data_length,
            buffer: BytesMut::with_capacity(max_data_length as usize),
        }
    }

    fn send_pdata(&mut self, data: Vec<u8>, is_last: bool) -> std::io::Result<()> {
        let pdu = Pdu::PData(PDataTf {
            values: vec![PresentationDataValue {
                presentation_context_id: self.presentation_context_id,
                is_command: self.is_command,
                is_last,
                data,
            }],
        });
        write_pdu(&mut self.stream, &pdu).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.dispatch_excess_data()?;
        let data = std::mem::take(&mut self.buffer).to_vec();
        self.send_pdata(data, true)
    }

    fn dispatch_excess_data(&mut self) -> std::io::Result<()> {
        while self.buffer.len() > self.max_data_length as usize {
            let rest = self.buffer.split_off(self.max_data_length as usize);
            let data = std::mem::replace(&mut self.buffer, rest).to_vec();
            self.send_pdata(data, false)?;
        }
        Ok(())
    }
}

impl<W> Write for PDataWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dispatch_excess_data()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<W> Drop for PDataWriter<W>
where
    W: Write,
{
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// The maximum length of actual fragment data for a single P-DATA PDU
/// carrying exactly one presentation data value, given the negotiated
/// maximum PDU length (which includes the 6-byte common PDU header).
#[inline]
fn calculate_max_data_len_single(max_pdu_length: u32) -> u32 {
    max_pdu_length
        // common PDU header
        .saturating_sub(6)
        // presentation data value length field
        .saturating_sub(4)
        // presentation context id + message control header
        .saturating_sub(2)
}
