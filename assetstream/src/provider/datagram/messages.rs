//! Typed datagram messages exchanged with the asset server.

use bytes::Bytes;
use uuid::Uuid;

/// Channel a generic transfer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Misc = 1,
    Asset = 2,
}

/// Where the server should source a generic transfer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    File = 1,
    Asset = 2,
    SimInventoryItem = 3,
}

/// Image request flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Normal = 0,
    Baked = 1,
}

/// Status carried by transfer headers and packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Ok,
    Done,
    Skip,
    Abort,
    Error,
    UnknownSource,
    InsufficientPermissions,
    NotFound,
    Other(i32),
}

impl TransferStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => TransferStatus::Ok,
            1 => TransferStatus::Done,
            2 => TransferStatus::Skip,
            3 => TransferStatus::Abort,
            -1 => TransferStatus::Error,
            -2 => TransferStatus::UnknownSource,
            -3 => TransferStatus::InsufficientPermissions,
            -4 => TransferStatus::NotFound,
            other => TransferStatus::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            TransferStatus::Ok => 0,
            TransferStatus::Done => 1,
            TransferStatus::Skip => 2,
            TransferStatus::Abort => 3,
            TransferStatus::Error => -1,
            TransferStatus::UnknownSource => -2,
            TransferStatus::InsufficientPermissions => -3,
            TransferStatus::NotFound => -4,
            TransferStatus::Other(code) => code,
        }
    }

    /// Whether the transfer may continue.
    pub fn is_ok(self) -> bool {
        matches!(self, TransferStatus::Ok | TransferStatus::Done)
    }
}

/// Discard level that cancels an image request.
pub const IMAGE_CANCEL_DISCARD_LEVEL: i8 = -1;

/// Download priority for new requests.
pub const DEFAULT_PRIORITY: f32 = 100.0;

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Request (or cancel, with discard level -1 and priority 0) an image.
    RequestImage {
        image_id: Uuid,
        discard_level: i8,
        priority: f32,
        start_packet: u32,
        image_type: ImageType,
    },

    /// Start a generic transfer for an asset.
    TransferRequest {
        transfer_id: Uuid,
        channel: ChannelType,
        source: SourceType,
        priority: f32,
        asset_id: Uuid,
        asset_type: i32,
    },

    /// Abort a generic transfer.
    TransferAbort {
        transfer_id: Uuid,
        channel: ChannelType,
    },
}

impl OutboundMessage {
    pub fn request_image(image_id: Uuid) -> Self {
        OutboundMessage::RequestImage {
            image_id,
            discard_level: 0,
            priority: DEFAULT_PRIORITY,
            start_packet: 0,
            image_type: ImageType::Normal,
        }
    }

    pub fn cancel_image(image_id: Uuid) -> Self {
        OutboundMessage::RequestImage {
            image_id,
            discard_level: IMAGE_CANCEL_DISCARD_LEVEL,
            priority: 0.0,
            start_packet: 0,
            image_type: ImageType::Normal,
        }
    }

    pub fn transfer_request(transfer_id: Uuid, asset_id: Uuid, asset_type: i32) -> Self {
        OutboundMessage::TransferRequest {
            transfer_id,
            channel: ChannelType::Asset,
            source: SourceType::Asset,
            priority: DEFAULT_PRIORITY,
            asset_id,
            asset_type,
        }
    }

    pub fn transfer_abort(transfer_id: Uuid) -> Self {
        OutboundMessage::TransferAbort {
            transfer_id,
            channel: ChannelType::Asset,
        }
    }
}

/// Messages the asset server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Image header: total size, packet count and the data of packet 0.
    ImageData {
        image_id: Uuid,
        codec: u8,
        size: u32,
        packets: u16,
        data: Bytes,
    },

    /// Image data packet (index 1 and up).
    ImagePacket {
        image_id: Uuid,
        packet_index: u16,
        data: Bytes,
    },

    /// The server has no such image.
    ImageNotInDatabase { image_id: Uuid },

    /// Generic transfer header.
    TransferInfo {
        transfer_id: Uuid,
        channel: ChannelType,
        target: i32,
        status: TransferStatus,
        size: i32,
    },

    /// Generic transfer data packet.
    TransferPacket {
        transfer_id: Uuid,
        channel: ChannelType,
        packet_index: i32,
        status: TransferStatus,
        data: Bytes,
    },

    /// The server aborted a generic transfer.
    TransferAbort { transfer_id: Uuid },
}
