//! 钱包地址校验
//!
//! 创建钱包前按网络校验地址格式，并给出入库时的规范化形式

use sha3::{Digest, Keccak256};

use crate::domain::Network;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 按网络校验地址
    pub fn validate(network: Network, address: &str) -> bool {
        let address = address.trim();
        match network {
            Network::Ethereum | Network::Arbitrum | Network::Base | Network::Polygon => {
                Self::validate_evm_address(address)
            }
            Network::Solana => Self::validate_solana_address(address),
            Network::Bitcoin => Self::validate_bitcoin_address(address),
        }
    }

    /// 入库形式：EVM 地址统一小写，其余原样（base58 区分大小写）
    pub fn normalize(network: Network, address: &str) -> String {
        let address = address.trim();
        if network.is_evm() {
            address.to_lowercase()
        } else if network == Network::Bitcoin && address.to_lowercase().starts_with("bc1") {
            address.to_lowercase()
        } else {
            address.to_string()
        }
    }

    /// EVM 地址（含大写字母时校验 EIP-55）
    fn validate_evm_address(address: &str) -> bool {
        let Some(hex_part) = address.strip_prefix("0x") else {
            return false;
        };
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::verify_eip55_checksum(hex_part);
        }

        true
    }

    /// https://eips.ethereum.org/EIPS/eip-55
    fn verify_eip55_checksum(hex_part: &str) -> bool {
        let hash = Keccak256::digest(hex_part.to_lowercase().as_bytes());

        hex_part.chars().enumerate().all(|(i, ch)| {
            if !ch.is_ascii_alphabetic() {
                return true;
            }
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            ch.is_ascii_uppercase() == (nibble >= 8)
        })
    }

    /// Solana 公钥：base58 编码的 32 字节
    fn validate_solana_address(address: &str) -> bool {
        if address.len() < 32 || address.len() > 44 {
            return false;
        }
        if !address.chars().all(|c| BASE58_ALPHABET.contains(c)) {
            return false;
        }

        matches!(bs58::decode(address).into_vec(), Ok(decoded) if decoded.len() == 32)
    }

    /// Bitcoin：P2PKH(1...) / P2SH(3...) / SegWit(bc1q...) / Taproot(bc1p...)
    fn validate_bitcoin_address(address: &str) -> bool {
        if address.starts_with('1') || address.starts_with('3') {
            return Self::validate_base58_bitcoin_address(address);
        }

        let lower = address.to_lowercase();
        // bech32 不允许大小写混用
        if address != lower && address != address.to_uppercase() {
            return false;
        }
        if lower.starts_with("bc1q") || lower.starts_with("bc1p") {
            return Self::validate_bech32_address(&lower);
        }

        false
    }

    /// base58check 地址：版本字节（P2PKH 0x00 / P2SH 0x05）+ 20 字节哈希 + 4 字节校验和
    fn validate_base58_bitcoin_address(address: &str) -> bool {
        if address.len() < 26 || address.len() > 35 {
            return false;
        }
        if !address.chars().all(|c| BASE58_ALPHABET.contains(c)) {
            return false;
        }

        let version = if address.starts_with('1') { 0x00 } else { 0x05 };
        matches!(
            bs58::decode(address).with_check(Some(version)).into_vec(),
            Ok(payload) if payload.len() == 21
        )
    }

    /// bech32/bech32m 地址只做字符集与长度检查
    fn validate_bech32_address(lower: &str) -> bool {
        // bc1q: P2WPKH 42 / P2WSH 62；bc1p: 62
        let valid_len = if lower.starts_with("bc1q") {
            lower.len() == 42 || lower.len() == 62
        } else {
            lower.len() == 62
        };

        valid_len && lower[3..].chars().all(|c| BECH32_CHARSET.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_address_validation() {
        assert!(AddressValidator::validate(
            Network::Ethereum,
            "0x742d35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
        // EIP-55 正确校验和
        assert!(AddressValidator::validate(
            Network::Base,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        // 校验和错误
        assert!(!AddressValidator::validate(
            Network::Ethereum,
            "0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        assert!(!AddressValidator::validate(Network::Polygon, "0x123"));
        assert!(!AddressValidator::validate(
            Network::Ethereum,
            "742d35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
        assert!(!AddressValidator::validate(
            Network::Arbitrum,
            "0xGGGG35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
    }

    #[test]
    fn test_solana_address_validation() {
        assert!(AddressValidator::validate(
            Network::Solana,
            "So11111111111111111111111111111111111111112"
        ));
        assert!(AddressValidator::validate(
            Network::Solana,
            "11111111111111111111111111111111"
        ));
        // 含非法字符 0
        assert!(!AddressValidator::validate(
            Network::Solana,
            "0o11111111111111111111111111111111111111112"
        ));
        assert!(!AddressValidator::validate(Network::Solana, "short"));
    }

    #[test]
    fn test_bitcoin_address_validation() {
        assert!(AddressValidator::validate(
            Network::Bitcoin,
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        ));
        assert!(AddressValidator::validate(
            Network::Bitcoin,
            "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"
        ));
        assert!(AddressValidator::validate(
            Network::Bitcoin,
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
        ));
        assert!(AddressValidator::validate(
            Network::Bitcoin,
            "bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297"
        ));
        assert!(!AddressValidator::validate(
            Network::Bitcoin,
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdb"
        ));
        assert!(!AddressValidator::validate(Network::Bitcoin, "tb1qxyz"));
    }

    #[test]
    fn test_base58_bitcoin_checksum_enforced() {
        // 末位打错，长度与字符集都合法
        assert!(!AddressValidator::validate(
            Network::Bitcoin,
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb"
        ));
        assert!(!AddressValidator::validate(
            Network::Bitcoin,
            "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLz"
        ));
        assert!(!AddressValidator::validate(Network::Bitcoin, ""));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            AddressValidator::normalize(
                Network::Ethereum,
                " 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed "
            ),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
        assert_eq!(
            AddressValidator::normalize(
                Network::Solana,
                "So11111111111111111111111111111111111111112"
            ),
            "So11111111111111111111111111111111111111112"
        );
    }
}
