//! Core types for the DAG ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for storage, hex strings in JSON)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Number of bytes in a serialized address (digest + checksum).
pub const ADDRESS_LEN: usize = 36;

/// Highest valid trust score.
pub const MAX_TRUST_SCORE: u8 = 100;

/// Number of trust-score buckets (scores 0..=100).
pub const TRUST_SCORE_BUCKETS: usize = MAX_TRUST_SCORE as usize + 1;

/// 32-byte content hash
///
/// Identifies transactions and currencies, and carries accumulated
/// index-chain digests. Binary formats store the raw bytes; human-readable
/// formats (JSON, TOML) use lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a hex string (64 characters)
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| crate::Error::InvalidHash(s.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| crate::Error::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serde_bytes::serialize(&self.0, serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes: [u8; 32] = serde_bytes::deserialize(deserializer)?;
            Ok(Hash(bytes))
        }
    }
}

/// Checksummed account address
///
/// 36 bytes: a 32-byte digest of the holder's public key followed by a
/// 4-byte checksum trailer. The checksum is the first four bytes of the
/// BLAKE3 hash of the digest, so a mistyped or truncated address fails
/// validation instead of silently crediting the wrong account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Build an address from a 32-byte digest, computing the checksum trailer
    pub fn from_digest(digest: [u8; 32]) -> Self {
        let checksum = Self::checksum(&digest);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[..32].copy_from_slice(&digest);
        bytes[32..].copy_from_slice(&checksum);
        Self(bytes)
    }

    /// Create from raw bytes, validating the checksum trailer
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> crate::Result<Self> {
        let address = Self(bytes);
        if !address.checksum_valid() {
            return Err(crate::Error::InvalidAddress(hex::encode(bytes)));
        }
        Ok(address)
    }

    /// Parse from a hex string (72 characters), validating the checksum
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| crate::Error::InvalidAddress(s.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| crate::Error::InvalidAddress(s.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Check the checksum trailer against the digest
    pub fn checksum_valid(&self) -> bool {
        let digest: [u8; 32] = self.0[..32].try_into().expect("fixed slice length");
        Self::checksum(&digest) == self.0[32..]
    }

    fn checksum(digest: &[u8; 32]) -> [u8; 4] {
        let hash = blake3::hash(digest);
        hash.as_bytes()[..4].try_into().expect("fixed slice length")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serde_bytes::serialize(&self.0, serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes: [u8; ADDRESS_LEN] = serde_bytes::deserialize(deserializer)?;
            Address::from_bytes(bytes).map_err(serde::de::Error::custom)
        }
    }
}

/// Sender trust score, an integer in 0..=100
///
/// The score doubles as the index of the source bucket a transaction
/// belongs to while it is a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrustScore(u8);

impl TrustScore {
    /// Create a validated trust score
    pub fn new(value: u8) -> crate::Result<Self> {
        if value > MAX_TRUST_SCORE {
            return Err(crate::Error::InvalidTrustScore(value));
        }
        Ok(Self(value))
    }

    /// Get the raw score
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Source bucket index for this score
    pub fn bucket(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One balance movement inside a transaction
///
/// Positive amounts credit the address, negative amounts debit it. Leg
/// amounts within one transaction are not required to sum to zero: currency
/// creation and minting introduce new supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    /// Account the amount applies to
    pub address: Address,

    /// Currency being moved
    pub currency: Hash,

    /// Signed amount (exact decimal)
    pub amount: Decimal,
}

impl TransferLeg {
    /// Create a new leg
    pub fn new(address: Address, currency: Hash, amount: Decimal) -> Self {
        Self {
            address,
            currency,
            amount,
        }
    }
}

/// Transaction kind, selecting kind-specific confirmation side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Ordinary value transfer
    Transfer,
    /// Introduces a new currency
    CurrencyCreation,
    /// Mints additional supply of an existing currency
    Minting,
}

/// Trust-chain confirmation signal for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfirmation {
    /// Confirmed transaction
    pub transaction_hash: Hash,

    /// Cumulative trust achieved by the confirming chain
    pub trust_score: f64,

    /// When trust-chain confirmation was reached
    pub timestamp: DateTime<Utc>,
}

/// Index consensus signal: a transaction's position in the global order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfirmation {
    /// Indexed transaction
    pub transaction_hash: Hash,

    /// Position in the global hash-chained order
    pub index: u64,

    /// When the position was assigned
    pub timestamp: DateTime<Utc>,
}

/// One link of the hash-chained transaction index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Position in the chain, starting at 0
    pub index: u64,

    /// Transaction occupying this position
    pub transaction_hash: Hash,

    /// Rolling digest over all entries up to and including this one
    pub accumulated_hash: Hash,
}

/// A transaction in the DAG
///
/// Parents are fixed at admission; the child set only grows as later
/// transactions attach. The two confirmation facets (trust chain, index)
/// arrive independently and in any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash identifying this transaction
    pub hash: Hash,

    /// First approved parent, if any
    pub left_parent: Option<Hash>,

    /// Second approved parent, if any
    pub right_parent: Option<Hash>,

    /// Hashes of transactions that approved this one (monotonic)
    pub children: Vec<Hash>,

    /// Trust score of the sender at admission
    pub sender_trust_score: TrustScore,

    /// Transaction kind
    pub kind: TransactionKind,

    /// Balance movements carried by this transaction
    pub legs: Vec<TransferLeg>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the transaction was attached to the DAG
    pub attachment_time: Option<DateTime<Utc>>,

    /// Whether trust-chain consensus was reached
    pub trust_chain_confirmed: bool,

    /// Cumulative trust achieved when trust-chain consensus was reached
    pub trust_chain_trust_score: f64,

    /// When trust-chain consensus was reached
    pub trust_chain_time: Option<DateTime<Utc>>,

    /// Index consensus outcome, once assigned a position
    pub index_confirmation: Option<IndexConfirmation>,

    /// When both confirmation facets were present and balances were applied
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new unconfirmed transaction
    pub fn new(
        hash: Hash,
        left_parent: Option<Hash>,
        right_parent: Option<Hash>,
        sender_trust_score: TrustScore,
        kind: TransactionKind,
        legs: Vec<TransferLeg>,
    ) -> Self {
        Self {
            hash,
            left_parent,
            right_parent,
            children: Vec::new(),
            sender_trust_score,
            kind,
            legs,
            created_at: Utc::now(),
            attachment_time: None,
            trust_chain_confirmed: false,
            trust_chain_trust_score: 0.0,
            trust_chain_time: None,
            index_confirmation: None,
            settled_at: None,
        }
    }

    /// Iterate over declared parents
    pub fn parents(&self) -> impl Iterator<Item = Hash> + '_ {
        self.left_parent.iter().chain(self.right_parent.iter()).copied()
    }

    /// A source is a transaction no other transaction has approved yet
    pub fn is_source(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the index facet has been confirmed
    pub fn is_index_confirmed(&self) -> bool {
        self.index_confirmation.is_some()
    }

    /// Whether both confirmation facets are present
    pub fn is_fully_confirmed(&self) -> bool {
        self.trust_chain_confirmed && self.index_confirmation.is_some()
    }

    /// Record a child approval; duplicate children are ignored
    pub fn add_child(&mut self, child: Hash) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Reduced view used during cold-start index replay
    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            hash: self.hash,
            trust_chain_confirmed: self.trust_chain_confirmed,
            legs: self.legs.clone(),
        }
    }
}

/// Reduced transaction view for cold-start replay
///
/// Carries just enough to re-verify the index chain and re-apply durable
/// balances for transactions that were already fully confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Transaction hash
    pub hash: Hash,

    /// Whether trust-chain consensus had been reached
    pub trust_chain_confirmed: bool,

    /// Balance movements to re-apply if fully confirmed
    pub legs: Vec<TransferLeg>,
}

/// Digital signature (Ed25519)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

        let signature = DalekSignature::from_bytes(&self.bytes);

        let verifying_key = match VerifyingKey::from_bytes(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> Hash {
        Hash::from_bytes([n; 32])
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let original = hash(7);
        let encoded = original.to_string();
        assert_eq!(encoded.len(), 64);

        let decoded = Hash::from_hex(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_hash_from_hex_rejects_bad_input() {
        assert!(Hash::from_hex("zz").is_err());
        assert!(Hash::from_hex("abcd").is_err()); // Too short
    }

    #[test]
    fn test_address_checksum() {
        let address = Address::from_digest([3u8; 32]);
        assert!(address.checksum_valid());

        // Corrupt the trailer
        let mut bytes = *address.as_bytes();
        bytes[35] ^= 0xff;
        assert!(Address::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Address::from_digest([9u8; 32]);
        let encoded = address.to_string();
        assert_eq!(encoded.len(), ADDRESS_LEN * 2);

        let decoded = Address::from_hex(&encoded).unwrap();
        assert_eq!(decoded, address);
    }

    #[test]
    fn test_trust_score_validation() {
        assert!(TrustScore::new(0).is_ok());
        assert!(TrustScore::new(100).is_ok());
        assert!(TrustScore::new(101).is_err());

        assert_eq!(TrustScore::new(42).unwrap().bucket(), 42);
    }

    #[test]
    fn test_transaction_source_status() {
        let mut transaction = Transaction::new(
            hash(1),
            None,
            None,
            TrustScore::new(50).unwrap(),
            TransactionKind::Transfer,
            vec![],
        );
        assert!(transaction.is_source());

        transaction.add_child(hash(2));
        assert!(!transaction.is_source());

        // Duplicate children are ignored
        transaction.add_child(hash(2));
        assert_eq!(transaction.children.len(), 1);
    }

    #[test]
    fn test_transaction_confirmation_facets() {
        let mut transaction = Transaction::new(
            hash(1),
            Some(hash(2)),
            Some(hash(3)),
            TrustScore::new(80).unwrap(),
            TransactionKind::Transfer,
            vec![],
        );
        assert!(!transaction.is_fully_confirmed());
        assert_eq!(transaction.parents().count(), 2);

        transaction.trust_chain_confirmed = true;
        assert!(!transaction.is_fully_confirmed());

        transaction.index_confirmation = Some(IndexConfirmation {
            transaction_hash: transaction.hash,
            index: 0,
            timestamp: Utc::now(),
        });
        assert!(transaction.is_fully_confirmed());
    }

    #[test]
    fn test_transaction_bincode_roundtrip() {
        let transaction = Transaction::new(
            hash(1),
            Some(hash(2)),
            None,
            TrustScore::new(60).unwrap(),
            TransactionKind::Minting,
            vec![TransferLeg::new(
                Address::from_digest([4u8; 32]),
                hash(5),
                Decimal::new(12345, 2),
            )],
        );

        let bytes = bincode::serialize(&transaction).unwrap();
        let decoded: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, transaction);
    }

    #[test]
    fn test_hash_json_uses_hex() {
        let value = serde_json::to_string(&hash(0xab)).unwrap();
        assert_eq!(value, format!("\"{}\"", "ab".repeat(32)));

        let parsed: Hash = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed, hash(0xab));
    }
}
