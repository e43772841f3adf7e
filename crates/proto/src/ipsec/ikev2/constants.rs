//! IKEv2 protocol constants from RFC 7296

/// IKE version 2 (major version = 2, minor version = 0)
pub const IKE_VERSION: u8 = 0x20;

/// Supported major version
pub const IKE_MAJOR_VERSION: u8 = 2;

/// Maximum IKE message size (64KB - 1)
pub const MAX_IKE_MESSAGE_SIZE: u32 = 65535;

/// IKE header size (28 bytes)
pub const IKE_HEADER_SIZE: usize = 28;

/// Generic payload header size (4 bytes)
pub const PAYLOAD_HEADER_SIZE: usize = 4;

/// Size of the fragment number and total fragments fields of SKF (RFC 7383)
pub const SKF_SUBHEADER_SIZE: usize = 4;

/// SPI size for AH/ESP SAs
pub const SPI_LEN_IPSEC: usize = 4;

/// SPI size for IKE SAs
pub const SPI_LEN_IKE: usize = 8;

/// Exchange Types (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ExchangeType {
    /// IKE_SA_INIT exchange (34)
    IkeSaInit = 34,
    /// IKE_AUTH exchange (35)
    IkeAuth = 35,
    /// CREATE_CHILD_SA exchange (36)
    CreateChildSa = 36,
    /// INFORMATIONAL exchange (37)
    Informational = 37,
}

impl ExchangeType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            34 => Some(ExchangeType::IkeSaInit),
            35 => Some(ExchangeType::IkeAuth),
            36 => Some(ExchangeType::CreateChildSa),
            37 => Some(ExchangeType::Informational),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Finer classification of a request within its exchange type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExchangeSubType {
    /// CREATE_CHILD_SA request without SA payload
    Invalid,
    /// IKE_SA_INIT
    IkeInit,
    /// IKE_AUTH
    IkeAuth,
    /// CREATE_CHILD_SA creating a new Child SA
    CreateChild,
    /// INFORMATIONAL deleting Child SAs
    DeleteChild,
    /// CREATE_CHILD_SA rekeying the IKE SA
    RekeyIke,
    /// CREATE_CHILD_SA rekeying a Child SA
    RekeyChild,
    /// INFORMATIONAL deleting the IKE SA
    DeleteIke,
    /// Any other INFORMATIONAL
    GenericInfo,
}

/// IKE message flags (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IkeFlags(u8);

impl IkeFlags {
    /// Response flag (bit 5)
    pub const RESPONSE: u8 = 0x20;
    /// Version flag (bit 4)
    pub const VERSION: u8 = 0x10;
    /// Initiator flag (bit 3)
    pub const INITIATOR: u8 = 0x08;

    /// Create new flags
    pub fn new(value: u8) -> Self {
        IkeFlags(value & 0x38) // Mask to only keep bits 3-5
    }

    /// Build flags from the response and initiator booleans
    pub fn from_parts(is_response: bool, from_initiator: bool) -> Self {
        let mut flags = 0;
        if is_response {
            flags |= Self::RESPONSE;
        }
        if from_initiator {
            flags |= Self::INITIATOR;
        }
        IkeFlags(flags)
    }

    /// Create flags for request
    pub fn request(is_initiator: bool) -> Self {
        Self::from_parts(false, is_initiator)
    }

    /// Create flags for response
    pub fn response(is_initiator: bool) -> Self {
        Self::from_parts(true, is_initiator)
    }

    /// Check if this is a response
    pub fn is_response(self) -> bool {
        (self.0 & Self::RESPONSE) != 0
    }

    /// Check if this is from initiator
    pub fn is_initiator(self) -> bool {
        (self.0 & Self::INITIATOR) != 0
    }

    /// Get raw value
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Payload Types (RFC 7296 Section 3.2, RFC 7383 Section 2.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PayloadType {
    /// No next payload (0)
    None = 0,
    /// Security Association (33)
    SA = 33,
    /// Key Exchange (34)
    KE = 34,
    /// Identification - Initiator (35)
    IDi = 35,
    /// Identification - Responder (36)
    IDr = 36,
    /// Certificate (37)
    CERT = 37,
    /// Certificate Request (38)
    CERTREQ = 38,
    /// Authentication (39)
    AUTH = 39,
    /// Nonce (40)
    Nonce = 40,
    /// Notify (41)
    N = 41,
    /// Delete (42)
    D = 42,
    /// Vendor ID (43)
    V = 43,
    /// Traffic Selector - Initiator (44)
    TSi = 44,
    /// Traffic Selector - Responder (45)
    TSr = 45,
    /// Encrypted and Authenticated (46)
    SK = 46,
    /// Configuration (47)
    CP = 47,
    /// Extensible Authentication (48)
    EAP = 48,
    /// Encrypted and Authenticated Fragment (53)
    SKF = 53,
}

impl PayloadType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PayloadType::None),
            33 => Some(PayloadType::SA),
            34 => Some(PayloadType::KE),
            35 => Some(PayloadType::IDi),
            36 => Some(PayloadType::IDr),
            37 => Some(PayloadType::CERT),
            38 => Some(PayloadType::CERTREQ),
            39 => Some(PayloadType::AUTH),
            40 => Some(PayloadType::Nonce),
            41 => Some(PayloadType::N),
            42 => Some(PayloadType::D),
            43 => Some(PayloadType::V),
            44 => Some(PayloadType::TSi),
            45 => Some(PayloadType::TSr),
            46 => Some(PayloadType::SK),
            47 => Some(PayloadType::CP),
            48 => Some(PayloadType::EAP),
            53 => Some(PayloadType::SKF),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether more than one payload of this type may appear in a message
    pub fn is_repeatable(self) -> bool {
        matches!(
            self,
            PayloadType::CERT
                | PayloadType::CERTREQ
                | PayloadType::N
                | PayloadType::D
                | PayloadType::V
        )
    }
}

/// Security Protocol Identifier (RFC 7296 Section 3.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ProtocolId {
    /// IKE SA
    Ike = 1,
    /// Authentication Header
    Ah = 2,
    /// Encapsulating Security Payload
    Esp = 3,
}

impl ProtocolId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ProtocolId::Ike),
            2 => Some(ProtocolId::Ah),
            3 => Some(ProtocolId::Esp),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Notify Message Types (RFC 7296 Section 3.10.1, RFC 7383, RFC 7427)
pub mod notify {
    /// Highest value of the error notify range
    pub const ERROR_NOTIFY_TYPE_MAX: u16 = 16383;

    /// UNSUPPORTED_CRITICAL_PAYLOAD
    pub const UNSUPPORTED_CRITICAL_PAYLOAD: u16 = 1;
    /// INVALID_IKE_SPI
    pub const INVALID_IKE_SPI: u16 = 4;
    /// INVALID_MAJOR_VERSION
    pub const INVALID_MAJOR_VERSION: u16 = 5;
    /// INVALID_SYNTAX
    pub const INVALID_SYNTAX: u16 = 7;
    /// INVALID_MESSAGE_ID
    pub const INVALID_MESSAGE_ID: u16 = 9;
    /// INVALID_SPI
    pub const INVALID_SPI: u16 = 11;
    /// NO_PROPOSAL_CHOSEN
    pub const NO_PROPOSAL_CHOSEN: u16 = 14;
    /// INVALID_KE_PAYLOAD
    pub const INVALID_KE_PAYLOAD: u16 = 17;
    /// AUTHENTICATION_FAILED
    pub const AUTHENTICATION_FAILED: u16 = 24;
    /// SINGLE_PAIR_REQUIRED
    pub const SINGLE_PAIR_REQUIRED: u16 = 34;
    /// NO_ADDITIONAL_SAS
    pub const NO_ADDITIONAL_SAS: u16 = 35;
    /// INTERNAL_ADDRESS_FAILURE
    pub const INTERNAL_ADDRESS_FAILURE: u16 = 36;
    /// FAILED_CP_REQUIRED
    pub const FAILED_CP_REQUIRED: u16 = 37;
    /// TS_UNACCEPTABLE
    pub const TS_UNACCEPTABLE: u16 = 38;
    /// INVALID_SELECTORS
    pub const INVALID_SELECTORS: u16 = 39;
    /// TEMPORARY_FAILURE
    pub const TEMPORARY_FAILURE: u16 = 43;
    /// CHILD_SA_NOT_FOUND
    pub const CHILD_SA_NOT_FOUND: u16 = 44;

    /// INITIAL_CONTACT
    pub const INITIAL_CONTACT: u16 = 16384;
    /// SET_WINDOW_SIZE
    pub const SET_WINDOW_SIZE: u16 = 16385;
    /// ADDITIONAL_TS_POSSIBLE
    pub const ADDITIONAL_TS_POSSIBLE: u16 = 16386;
    /// IPCOMP_SUPPORTED
    pub const IPCOMP_SUPPORTED: u16 = 16387;
    /// NAT_DETECTION_SOURCE_IP
    pub const NAT_DETECTION_SOURCE_IP: u16 = 16388;
    /// NAT_DETECTION_DESTINATION_IP
    pub const NAT_DETECTION_DESTINATION_IP: u16 = 16389;
    /// COOKIE
    pub const COOKIE: u16 = 16390;
    /// USE_TRANSPORT_MODE
    pub const USE_TRANSPORT_MODE: u16 = 16391;
    /// REKEY_SA
    pub const REKEY_SA: u16 = 16393;
    /// ESP_TFC_PADDING_NOT_SUPPORTED
    pub const ESP_TFC_PADDING_NOT_SUPPORTED: u16 = 16394;
    /// MOBIKE_SUPPORTED
    pub const MOBIKE_SUPPORTED: u16 = 16396;
    /// UPDATE_SA_ADDRESSES
    pub const UPDATE_SA_ADDRESSES: u16 = 16400;
    /// EAP_ONLY_AUTHENTICATION
    pub const EAP_ONLY_AUTHENTICATION: u16 = 16417;
    /// IKEV2_FRAGMENTATION_SUPPORTED
    pub const IKEV2_FRAGMENTATION_SUPPORTED: u16 = 16430;
    /// SIGNATURE_HASH_ALGORITHMS
    pub const SIGNATURE_HASH_ALGORITHMS: u16 = 16431;

    /// Notify types that refer to an existing Child SA and carry its SPI
    pub const CHILD_SA_SPI_NOTIFY_TYPES: [u16; 3] = [INVALID_SELECTORS, CHILD_SA_NOT_FOUND, REKEY_SA];
}
