//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).
//!
//! Der Codec ist generisch ueber Lese- und Schreibtyp: der Hub liest
//! `Eingehend` und schreibt `Ausgehend`, ein Client umgekehrt.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::io;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::event::{Ausgehend, Eingehend};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// `D` ist der dekodierte (gelesene) Typ, `E` der kodierte (geschriebene).
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use treffpunkt_protocol::wire::ServerCodec;
///
/// // let stream = listener.accept().await?.0;
/// // let framed = Framed::new(stream, ServerCodec::new());
/// ```
#[derive(Debug)]
pub struct FrameCodec<D, E> {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
    _typen: PhantomData<fn(E) -> D>,
}

/// Codec auf Hub-Seite
pub type ServerCodec = FrameCodec<Eingehend, Ausgehend>;

/// Codec auf Client-Seite (Tests, Bots)
pub type ClientCodec = FrameCodec<Ausgehend, Eingehend>;

impl<D, E> FrameCodec<D, E> {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _typen: PhantomData,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<D, E> Default for FrameCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E> Clone for FrameCodec<D, E> {
    fn clone(&self) -> Self {
        Self::with_max_size(self.max_frame_size)
    }
}

fn zu_gross(laenge: usize, max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Frame zu gross: {} Bytes (Maximum: {} Bytes)", laenge, max),
    )
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<D: DeserializeOwned, E> Decoder for FrameCodec<D, E> {
    type Item = D;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(zu_gross(length, self.max_frame_size));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let message = serde_json::from_slice(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
            )
        })?;

        Ok(Some(message))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<D, E: Serialize> Encoder<E> for FrameCodec<D, E> {
    type Error = io::Error;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_frame_size {
            return Err(zu_gross(json.len(), self.max_frame_size));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei ungueltigem JSON oder zu grossem Frame
pub async fn read_frame<R, T>(reader: &mut R, max_frame_size: usize) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;

    if length > max_frame_size {
        return Err(zu_gross(length, max_frame_size));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    serde_json::from_slice(&payload).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
        )
    })
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_size: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(message).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {}", e),
        )
    })?;

    if json.len() > max_frame_size {
        return Err(zu_gross(json.len(), max_frame_size));
    }

    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PingMessage, TypingRequest};
    use treffpunkt_core::types::Identity;

    fn typing_event() -> Eingehend {
        Eingehend::Typing(TypingRequest {
            recipient: Identity::from("u2"),
        })
    }

    #[test]
    fn client_schreibt_server_liest() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();

        let mut buf = BytesMut::new();
        client.encode(typing_event(), &mut buf).unwrap();

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        let decoded = server.decode(&mut buf).unwrap().expect("Event erwartet");
        assert!(matches!(decoded, Eingehend::Typing(ref t) if t.recipient.as_str() == "u2"));
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();

        let mut buf = BytesMut::new();
        client.encode(typing_event(), &mut buf).unwrap();

        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);
        assert!(server.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn ablehnung_zu_grosser_frame() {
        let mut codec = ServerCodec::with_max_size(100);

        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn ungueltiges_json_ist_fehler() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::new();
        let muell = b"{\"event\":\"gibtsnicht\"}";
        buf.put_u32(muell.len() as u32);
        buf.put_slice(muell);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn mehrere_events_im_buffer() {
        let mut server = ServerCodec::new();
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();

        for i in 0..3u64 {
            server.encode(Ausgehend::ping(i), &mut buf).unwrap();
        }

        for i in 0..3u64 {
            let msg = client.decode(&mut buf).unwrap().expect("Event erwartet");
            assert_eq!(msg, Ausgehend::Ping(PingMessage { timestamp_ms: i }));
        }

        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn async_read_write_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &typing_event(), DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();

        let mut cursor = io::Cursor::new(buffer);
        let decoded: Eingehend = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert_eq!(decoded.name(), "typing");
    }

    #[tokio::test]
    async fn async_write_frame_ablehnung_zu_grosse_nachricht() {
        let mut buffer: Vec<u8> = Vec::new();
        let result = write_frame(&mut buffer, &typing_event(), 5).await;
        assert!(result.is_err());
    }
}
