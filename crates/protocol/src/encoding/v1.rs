use async_trait::async_trait;
use binary_stream::futures::{
    BinaryReader, BinaryWriter, Decodable, Encodable,
};
use futures::io::{AsyncRead, AsyncSeek, AsyncWrite};
use std::io::Result;

use crate::{
    encoding::{invalid_data, types, FRAME_LIMIT},
    Command, CommandResponse, InvitationId, KeyHint, PublicKey,
    RejectReason, SignedMessage,
};

/// Version stamped into the frame header.
pub const VERSION: u8 = 1;

/// Write a length-prefixed block.
///
/// Blocks are bounded by the frame limit so a hostile length
/// prefix fails cleanly instead of demanding an absurd
/// allocation from the reader.
async fn put_block<W: AsyncWrite + AsyncSeek + Unpin + Send>(
    writer: &mut BinaryWriter<W>,
    block: &[u8],
) -> Result<()> {
    if block.len() > FRAME_LIMIT {
        return Err(invalid_data(crate::Error::OversizeBlock(
            block.len(),
        )));
    }
    writer.write_u32(block.len() as u32).await?;
    writer.write_bytes(block).await?;
    Ok(())
}

/// Read a length-prefixed block, enforcing the frame limit.
async fn take_block<R: AsyncRead + AsyncSeek + Unpin + Send>(
    reader: &mut BinaryReader<R>,
) -> Result<Vec<u8>> {
    let length = reader.read_u32().await? as usize;
    if length > FRAME_LIMIT {
        return Err(invalid_data(crate::Error::OversizeBlock(
            length,
        )));
    }
    reader.read_bytes(length).await
}

/// Signed messages travel as length-prefixed JSON blocks so the
/// `__type_url` tags survive the round trip verbatim.
async fn encode_message<W: AsyncWrite + AsyncSeek + Unpin + Send>(
    writer: &mut BinaryWriter<W>,
    message: &SignedMessage,
) -> Result<()> {
    let block =
        serde_json::to_vec(message).map_err(invalid_data)?;
    put_block(writer, &block).await
}

async fn decode_message<R: AsyncRead + AsyncSeek + Unpin + Send>(
    reader: &mut BinaryReader<R>,
) -> Result<SignedMessage> {
    let block = take_block(reader).await?;
    serde_json::from_slice(&block).map_err(invalid_data)
}

async fn encode_public_key<
    W: AsyncWrite + AsyncSeek + Unpin + Send,
>(
    writer: &mut BinaryWriter<W>,
    key: &PublicKey,
) -> Result<()> {
    writer.write_bytes(key.as_bytes()).await?;
    Ok(())
}

async fn decode_public_key<
    R: AsyncRead + AsyncSeek + Unpin + Send,
>(
    reader: &mut BinaryReader<R>,
) -> Result<PublicKey> {
    let bytes = reader.read_bytes(crate::PUBLIC_KEY_LEN).await?;
    bytes.as_slice().try_into().map_err(invalid_data)
}

async fn decode_invitation_id<
    R: AsyncRead + AsyncSeek + Unpin + Send,
>(
    reader: &mut BinaryReader<R>,
) -> Result<InvitationId> {
    Ok(InvitationId::from_bytes(
        reader
            .read_bytes(16)
            .await?
            .as_slice()
            .try_into()
            .map_err(invalid_data)?,
    ))
}

#[async_trait]
impl Encodable for Command {
    async fn encode<W: AsyncWrite + AsyncSeek + Unpin + Send>(
        &self,
        writer: &mut BinaryWriter<W>,
    ) -> Result<()> {
        let id: u8 = self.into();
        writer.write_u8(id).await?;
        match self {
            Self::Begin => {}
            Self::Handshake { secret } => {
                put_block(writer, secret).await?;
            }
            Self::Notarize { secret, messages } => {
                put_block(writer, secret).await?;
                writer.write_u32(messages.len() as u32).await?;
                for message in messages {
                    encode_message(writer, message).await?;
                }
            }
            Self::Finish => {}
            Self::Claim { id, claim } => {
                writer.write_bytes(id.as_bytes()).await?;
                encode_message(writer, claim).await?;
            }
            Self::Noop => unreachable!(),
        }
        Ok(())
    }
}

#[async_trait]
impl Decodable for Command {
    async fn decode<R: AsyncRead + AsyncSeek + Unpin + Send>(
        &mut self,
        reader: &mut BinaryReader<R>,
    ) -> Result<()> {
        let id = reader.read_u8().await?;
        match id {
            types::COMMAND_BEGIN => {
                *self = Command::Begin;
            }
            types::COMMAND_HANDSHAKE => {
                let secret = take_block(reader).await?;
                *self = Command::Handshake { secret };
            }
            types::COMMAND_NOTARIZE => {
                let secret = take_block(reader).await?;
                let size = reader.read_u32().await? as usize;
                let mut messages = Vec::with_capacity(size);
                for _ in 0..size {
                    messages.push(decode_message(reader).await?);
                }
                *self = Command::Notarize { secret, messages };
            }
            types::COMMAND_FINISH => {
                *self = Command::Finish;
            }
            types::COMMAND_CLAIM => {
                let id = decode_invitation_id(reader).await?;
                let claim = decode_message(reader).await?;
                *self = Command::Claim { id, claim };
            }
            _ => {
                return Err(invalid_data(
                    crate::Error::EncodingKind(id),
                ))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Encodable for CommandResponse {
    async fn encode<W: AsyncWrite + AsyncSeek + Unpin + Send>(
        &self,
        writer: &mut BinaryWriter<W>,
    ) -> Result<()> {
        let id: u8 = self.into();
        writer.write_u8(id).await?;
        match self {
            Self::Rejected(reason) => {
                let code: u8 = reason.into();
                writer.write_u8(code).await?;
            }
            Self::Began { id, auth_nonce } => {
                writer.write_bytes(id.as_bytes()).await?;
                put_block(writer, auth_nonce).await?;
            }
            Self::Handshook { party_key, nonce } => {
                encode_public_key(writer, party_key).await?;
                put_block(writer, nonce).await?;
            }
            Self::Notarized { copies, hints } => {
                writer.write_u32(copies.len() as u32).await?;
                for copy in copies {
                    encode_message(writer, copy).await?;
                }
                writer.write_u32(hints.len() as u32).await?;
                for hint in hints {
                    encode_public_key(writer, &hint.public_key)
                        .await?;
                    writer
                        .write_string(hint.key_type.to_string())
                        .await?;
                }
            }
            Self::Claimed {
                id,
                rendezvous_key,
            } => {
                writer.write_bytes(id.as_bytes()).await?;
                encode_public_key(writer, rendezvous_key).await?;
            }
            Self::Noop => unreachable!(),
        }
        Ok(())
    }
}

#[async_trait]
impl Decodable for CommandResponse {
    async fn decode<R: AsyncRead + AsyncSeek + Unpin + Send>(
        &mut self,
        reader: &mut BinaryReader<R>,
    ) -> Result<()> {
        let id = reader.read_u8().await?;
        match id {
            types::RESPONSE_REJECTED => {
                let code = reader.read_u8().await?;
                let reason: RejectReason =
                    code.try_into().map_err(invalid_data)?;
                *self = CommandResponse::Rejected(reason);
            }
            types::RESPONSE_BEGAN => {
                let id = decode_invitation_id(reader).await?;
                let auth_nonce = take_block(reader).await?;
                *self = CommandResponse::Began { id, auth_nonce };
            }
            types::RESPONSE_HANDSHOOK => {
                let party_key = decode_public_key(reader).await?;
                let nonce = take_block(reader).await?;
                *self =
                    CommandResponse::Handshook { party_key, nonce };
            }
            types::RESPONSE_NOTARIZED => {
                let size = reader.read_u32().await? as usize;
                let mut copies = Vec::with_capacity(size);
                for _ in 0..size {
                    copies.push(decode_message(reader).await?);
                }
                let size = reader.read_u32().await? as usize;
                let mut hints = Vec::with_capacity(size);
                for _ in 0..size {
                    let public_key =
                        decode_public_key(reader).await?;
                    let key_type = reader
                        .read_string()
                        .await?
                        .parse()
                        .map_err(invalid_data)?;
                    hints.push(KeyHint {
                        public_key,
                        key_type,
                    });
                }
                *self = CommandResponse::Notarized { copies, hints };
            }
            types::RESPONSE_CLAIMED => {
                let id = decode_invitation_id(reader).await?;
                let rendezvous_key =
                    decode_public_key(reader).await?;
                *self = CommandResponse::Claimed {
                    id,
                    rendezvous_key,
                };
            }
            _ => {
                return Err(invalid_data(
                    crate::Error::EncodingKind(id),
                ))
            }
        }
        Ok(())
    }
}
