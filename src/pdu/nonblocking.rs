//! Async counterparts of [`crate::pdu::reader::read_pdu`] and
//! [`crate::pdu::writer::write_pdu`], gated behind the `async` feature.
//!
//! Both functions share the same pure [`decode_pdu`]/[`encode_pdu`] core as
//! the blocking path; only the I/O discipline differs.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pdu::{
    reader::{self, decode_pdu},
    writer::encode_pdu,
    Pdu, PDU_HEADER_SIZE,
};

/// Read exactly one PDU from an async reader.
pub async fn read_pdu<R>(reader: &mut R) -> reader::Result<Pdu>
where
    R: AsyncRead + Unpin,
{
    use snafu::ResultExt;

    let mut header = [0u8; PDU_HEADER_SIZE as usize];
    reader
        .read_exact(&mut header)
        .await
        .context(reader::ReadHeaderSnafu)?;

    let length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    let mut full = Vec::with_capacity(PDU_HEADER_SIZE as usize + length as usize);
    full.extend_from_slice(&header);
    full.resize(full.len() + length as usize, 0);
    reader
        .read_exact(&mut full[PDU_HEADER_SIZE as usize..])
        .await
        .context(reader::ReadBodySnafu { length })?;

    decode_pdu(&full)
}

/// Encode and write a single PDU to an async writer.
pub async fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_pdu(pdu);
    writer.write_all(&bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::AbortRq;
    use crate::pdu::{AbortRqReason, AbortRqSource};

    #[tokio::test]
    async fn round_trips_over_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let pdu = Pdu::Abort(AbortRq {
            source: AbortRqSource::ServiceUser,
            reason: AbortRqReason::ReasonNotSpecified,
        });
        write_pdu(&mut a, &pdu).await.unwrap();
        let got = read_pdu(&mut b).await.unwrap();
        assert_eq!(got, pdu);
    }
}
