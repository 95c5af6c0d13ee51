//! AES-CBC sealing for OAuth `state` values and stored tokens.
//!
//! The key length picks AES-128/192/256; the IV is the first 16 key bytes.
//! Output is PKCS#7-padded ciphertext in unpadded URL-safe base64.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

#[derive(Clone)]
pub struct AesCbcCipher {
    key: Vec<u8>,
}

impl std::fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCbcCipher")
            .field("bits", &(self.key.len() * 8))
            .finish()
    }
}

impl AesCbcCipher {
    pub fn new(secret: &str) -> Result<Self> {
        let key = secret.as_bytes().to_vec();
        match key.len() {
            16 | 24 | 32 => Ok(Self { key }),
            n => bail!("invalid aes key length {n}, expected 16, 24 or 32 bytes"),
        }
    }

    fn iv(&self) -> &[u8] {
        &self.key[..16]
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<String> {
        let sealed = match self.key.len() {
            16 => seal::<cbc::Encryptor<aes::Aes128>>(&self.key, self.iv(), plain)?,
            24 => seal::<cbc::Encryptor<aes::Aes192>>(&self.key, self.iv(), plain)?,
            _ => seal::<cbc::Encryptor<aes::Aes256>>(&self.key, self.iv(), plain)?,
        };
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let sealed = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .context("ciphertext is not valid base64")?;
        match self.key.len() {
            16 => open::<cbc::Decryptor<aes::Aes128>>(&self.key, self.iv(), &sealed),
            24 => open::<cbc::Decryptor<aes::Aes192>>(&self.key, self.iv(), &sealed),
            _ => open::<cbc::Decryptor<aes::Aes256>>(&self.key, self.iv(), &sealed),
        }
    }

    pub fn encrypt_str(&self, plain: &str) -> Result<String> {
        self.encrypt(plain.as_bytes())
    }

    pub fn decrypt_str(&self, encoded: &str) -> Result<String> {
        String::from_utf8(self.decrypt(encoded)?).context("decrypted value is not utf-8")
    }
}

fn seal<C: KeyIvInit + BlockEncryptMut>(key: &[u8], iv: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slices(key, iv).map_err(|e| anyhow!("aes init: {e}"))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plain))
}

fn open<C: KeyIvInit + BlockDecryptMut>(key: &[u8], iv: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slices(key, iv).map_err(|e| anyhow!("aes init: {e}"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(sealed)
        .map_err(|e| anyhow!("aes decrypt: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_key_lengths() {
        assert!(AesCbcCipher::new("short").is_err());
        assert!(AesCbcCipher::new("0123456789abcdef").is_ok());
        assert!(AesCbcCipher::new("0123456789abcdef01234567").is_ok());
        assert!(AesCbcCipher::new("0123456789abcdef0123456789abcdef").is_ok());
    }

    #[test]
    fn seals_and_opens() {
        let cipher = AesCbcCipher::new("0123456789abcdef0123456789abcdef").unwrap();
        let sealed = cipher
            .encrypt_str(r#"{"user_id":"u1","plugin_id":7,"is_draft":false}"#)
            .unwrap();
        assert!(!sealed.contains('+') && !sealed.contains('/') && !sealed.contains('='));
        assert_eq!(
            cipher.decrypt_str(&sealed).unwrap(),
            r#"{"user_id":"u1","plugin_id":7,"is_draft":false}"#
        );
    }

    #[test]
    fn wrong_key_does_not_open() {
        let a = AesCbcCipher::new("0123456789abcdef").unwrap();
        let b = AesCbcCipher::new("fedcba9876543210").unwrap();
        let sealed = a.encrypt_str("secret payload").unwrap();
        let opened = b.decrypt_str(&sealed);
        assert!(opened.map(|s| s != "secret payload").unwrap_or(true));
    }
}
