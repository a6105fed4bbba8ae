//! AES-256-GCM 加密/解密模块
//! 用于凭据加密存储
//!
//! 密文格式：`iv_hex:authTag_hex:ciphertext_hex`（IV 16 字节，认证标签 16 字节）

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 16 字节 IV 的 AES-256-GCM
type Aes256Gcm16 = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// scrypt 参数：N=2^14, r=8, p=1
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault secret is not configured")]
    MissingSecret,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
    #[error("invalid ciphertext format")]
    InvalidFormat,
}

/// 加密密钥（使用Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; KEY_LEN],
}

impl EncryptionKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }
}

/// 从进程级密钥与应用级盐派生 32 字节密钥（scrypt，开销较大，只应在启动时调用一次）
pub fn derive_key(secret: &str, salt: &str) -> Result<EncryptionKey, VaultError> {
    if secret.is_empty() {
        return Err(VaultError::MissingSecret);
    }

    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(secret.as_bytes(), salt.as_bytes(), &params, &mut key)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    Ok(EncryptionKey::new(key))
}

/// 加密字符串，每次调用使用新的随机 IV
pub fn encrypt_string(plaintext: &str, key: &EncryptionKey) -> Result<String, VaultError> {
    let cipher =
        Aes256Gcm16::new_from_slice(key.as_slice()).map_err(|_| VaultError::Encryption)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    // aes-gcm 输出 ciphertext || tag
    let sealed = cipher
        .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| VaultError::Encryption)?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(ciphertext)
    ))
}

/// 解密 `iv:tag:ciphertext` 格式的字符串
pub fn decrypt_string(encoded: &str, key: &EncryptionKey) -> Result<String, VaultError> {
    let mut parts = encoded.split(':');
    let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VaultError::InvalidFormat);
    };

    let iv = hex::decode(iv_hex).map_err(|_| VaultError::InvalidFormat)?;
    let tag = hex::decode(tag_hex).map_err(|_| VaultError::InvalidFormat)?;
    let mut sealed = hex::decode(ct_hex).map_err(|_| VaultError::InvalidFormat)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::InvalidFormat);
    }
    sealed.extend_from_slice(&tag);

    let cipher =
        Aes256Gcm16::new_from_slice(key.as_slice()).map_err(|_| VaultError::Decryption)?;
    let plaintext = cipher
        .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
        .map_err(|_| VaultError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
}
