use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

/// zstd level used when the user does not pick one.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// One encrypted block on the wire: a length line then the four fields,
/// concatenated raw.
struct Frame {
    text: Vec<u8>,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    tag: Vec<u8>,
}

impl Frame {
    fn encode(&self) -> Vec<u8> {
        let head = format!(
            "{} {} {} {}\n",
            self.text.len(),
            self.salt.len(),
            self.nonce.len(),
            self.tag.len()
        );
        let mut out = Vec::with_capacity(head.len() + self.text.len() + SALT_LEN + NONCE_LEN + TAG_LEN);
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.text);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Decode back-to-back frames; there is no separator, each length line
    /// says exactly how far its fields reach.
    fn decode_all(raw: &[u8]) -> crate::Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut at = 0;
        while at < raw.len() {
            let head_end = raw[at..]
                .iter()
                .position(|b| *b == b'\n')
                .ok_or_else(|| crate::anyhow!("bad encrypted data: missing length line"))?;
            let head = std::str::from_utf8(&raw[at..at + head_end])
                .map_err(|_| crate::anyhow!("bad encrypted data: non-ascii length line"))?;
            at += head_end + 1;

            let lens: Vec<usize> = head
                .split(' ')
                .map(|f| f.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| crate::anyhow!("bad encrypted data: malformed length line"))?;
            let [text, salt, nonce, tag] = lens.as_slice() else {
                crate::bail!("bad encrypted data: expected four fields");
            };
            let mut field = |n: usize| -> crate::Result<Vec<u8>> {
                if raw.len() - at < n {
                    crate::bail!("bad encrypted data: truncated field");
                }
                let out = raw[at..at + n].to_vec();
                at += n;
                Ok(out)
            };
            frames.push(Frame {
                text: field(*text)?,
                salt: field(*salt)?,
                nonce: field(*nonce)?,
                tag: field(*tag)?,
            });
        }
        Ok(frames)
    }
}

fn derive_key(password: &str, salt: &[u8]) -> crate::Result<[u8; KEY_LEN]> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| crate::anyhow!("bad scrypt parameters: {e}"))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|e| crate::anyhow!("scrypt failed: {e}"))?;
    Ok(key)
}

/// Compress then encrypt one block. Empty blocks and a missing password
/// pass through untouched.
pub fn encrypt(data: &[u8], password: Option<&str>, level: i32) -> crate::Result<Vec<u8>> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        crate::trace!("Not encrypting");
        return Ok(data.to_vec());
    };
    if data.is_empty() {
        return Ok(Vec::new());
    }
    crate::debug!("Compressing {} byte chunk", data.len());
    let compressed = zstd::stream::encode_all(data, level)?;

    crate::debug!("Encrypting compressed {} byte chunk", compressed.len());
    let mut salt = vec![0u8; SALT_LEN];
    let mut nonce = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|_| crate::anyhow!("bad AES key length"))?;
    let mut text = cipher
        .encrypt(Nonce::from_slice(&nonce), compressed.as_slice())
        .map_err(|_| crate::anyhow!("encryption failed"))?;
    let tag = text.split_off(text.len() - TAG_LEN);
    Ok(Frame {
        text,
        salt,
        nonce,
        tag,
    }
    .encode())
}

/// Decrypt then decompress every frame in `data` and join the results.
/// Empty input and a missing password pass through untouched.
pub fn decrypt(data: &[u8], password: Option<&str>) -> crate::Result<Vec<u8>> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        crate::trace!("Not decrypting");
        return Ok(data.to_vec());
    };
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let frames = Frame::decode_all(data)?;
    crate::debug!("Decrypting {} chunk(s)", frames.len());
    let mut out = Vec::new();
    for frame in frames {
        let key = derive_key(password, &frame.salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| crate::anyhow!("bad AES key length"))?;
        let mut sealed = frame.text;
        sealed.extend_from_slice(&frame.tag);
        let compressed = cipher
            .decrypt(Nonce::from_slice(&frame.nonce), sealed.as_slice())
            .map_err(|_| crate::anyhow!("decryption failed; wrong password?"))?;
        out.extend_from_slice(&zstd::stream::decode_all(compressed.as_slice())?);
    }
    Ok(out)
}
