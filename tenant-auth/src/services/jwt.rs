use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::AuthError;
use super::password::{random_token, token_digest};
use crate::config::JwtConfig;
use crate::models::{Claims, Role, TokenPair, User};

/// Public half of a verification key, as published on the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

struct VerificationKey {
    decoding: DecodingKey,
    jwk: Jwk,
}

struct KeyRing {
    key_id: String,
    signing: Option<EncodingKey>,
    signing_public: Option<RsaPublicKey>,
    verification: BTreeMap<String, VerificationKey>,
}

/// RSA signing key plus a ring of verification keys indexed by `kid`.
///
/// Rotation installs a new active signing key while older public keys keep
/// verifying tokens issued before the switch, until they are retired.
pub struct KeyManager {
    ring: RwLock<KeyRing>,
}

impl KeyManager {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            ring: RwLock::new(KeyRing {
                key_id: key_id.into(),
                signing: None,
                signing_public: None,
                verification: BTreeMap::new(),
            }),
        }
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, AuthError> {
        let manager = Self::new(config.key_id.clone());
        manager.load_private_key_pem(config.private_key.expose_secret())?;
        manager.load_public_key_pem(&config.public_key)?;
        Ok(manager)
    }

    /// Install the signing key under the current key id. Its public half is
    /// registered for verification as well.
    pub fn load_private_key_pem(&self, pem: &str) -> Result<(), AuthError> {
        let private = parse_private_key(pem)?;
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to load signing key: {}", e))?;

        let mut ring = self.write()?;
        let kid = ring.key_id.clone();
        let public = RsaPublicKey::from(&private);
        let verification = verification_key(&public, &kid)?;
        ring.verification.insert(kid, verification);
        ring.signing = Some(encoding);
        ring.signing_public = Some(public);
        Ok(())
    }

    /// Replace the verification key registered under the current key id.
    /// Once a signing key is loaded, the public key must be its own half.
    pub fn load_public_key_pem(&self, pem: &str) -> Result<(), AuthError> {
        let public = parse_public_key(pem)?;

        let mut ring = self.write()?;
        let kid = ring.key_id.clone();
        if let Some(signing) = ring.signing_public.as_ref() {
            if *signing != public {
                return Err(
                    anyhow::anyhow!("Public key does not match private key {}", kid).into(),
                );
            }
        }
        let verification = verification_key(&public, &kid)?;
        ring.verification.insert(kid, verification);
        Ok(())
    }

    /// Rename the active key id. The active verification key follows it.
    pub fn set_key_id(&self, key_id: impl Into<String>) -> Result<(), AuthError> {
        let key_id = key_id.into();
        let mut ring = self.write()?;
        let previous = ring.key_id.clone();
        if let Some(mut entry) = ring.verification.remove(&previous) {
            entry.jwk.kid = key_id.clone();
            ring.verification.insert(key_id.clone(), entry);
        }
        ring.key_id = key_id;
        Ok(())
    }

    /// Make `(private_pem, public_pem)` the active pair under `key_id`.
    pub fn rotate(
        &self,
        key_id: impl Into<String>,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<(), AuthError> {
        let key_id = key_id.into();
        let private = parse_private_key(private_pem)?;
        let public = parse_public_key(public_pem)?;
        if RsaPublicKey::from(&private) != public {
            return Err(anyhow::anyhow!("Public key does not match private key {}", key_id).into());
        }

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to load signing key: {}", e))?;
        let verification = verification_key(&public, &key_id)?;

        let mut ring = self.write()?;
        ring.verification.insert(key_id.clone(), verification);
        ring.signing = Some(encoding);
        ring.signing_public = Some(public);
        ring.key_id = key_id.clone();
        drop(ring);

        tracing::info!(kid = %key_id, "Signing key rotated");
        Ok(())
    }

    /// Stop accepting tokens signed with `key_id`. The active key cannot be retired.
    pub fn retire(&self, key_id: &str) -> Result<bool, AuthError> {
        let mut ring = self.write()?;
        if ring.key_id == key_id {
            return Err(anyhow::anyhow!("Cannot retire the active signing key").into());
        }
        Ok(ring.verification.remove(key_id).is_some())
    }

    pub fn active_key_id(&self) -> Result<String, AuthError> {
        Ok(self.read()?.key_id.clone())
    }

    pub fn jwks(&self) -> Result<Jwks, AuthError> {
        let ring = self.read()?;
        Ok(Jwks {
            keys: ring.verification.values().map(|k| k.jwk.clone()).collect(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let ring = self.read()?;
        let key = ring
            .signing
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Signing key has not been loaded"))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(ring.key_id.clone());

        encode(&header, claims, key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e).into())
    }

    /// Tokens without a `kid` verify against the active key.
    fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let ring = self.read()?;
        let kid = kid.unwrap_or(&ring.key_id);
        ring.verification
            .get(kid)
            .map(|k| k.decoding.clone())
            .ok_or(AuthError::TokenInvalid)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, KeyRing>, AuthError> {
        self.ring
            .read()
            .map_err(|_| anyhow::anyhow!("key ring lock poisoned").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, KeyRing>, AuthError> {
        self.ring
            .write()
            .map_err(|_| anyhow::anyhow!("key ring lock poisoned").into())
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AuthError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e).into())
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, AuthError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e).into())
}

fn verification_key(public: &RsaPublicKey, kid: &str) -> Result<VerificationKey, AuthError> {
    let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());
    let decoding = DecodingKey::from_rsa_components(&n, &e)
        .map_err(|e| anyhow::anyhow!("Failed to build verification key: {}", e))?;

    Ok(VerificationKey {
        decoding,
        jwk: Jwk {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: kid.to_string(),
            n,
            e,
        },
    })
}

/// Issuer, audience and lifetimes for issued tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: Vec<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl From<&JwtConfig> for TokenConfig {
    fn from(config: &JwtConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_token_ttl: Duration::days(config.refresh_token_expiry_days),
        }
    }
}

/// Issues RS256 access tokens and opaque refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<KeyManager>,
    config: TokenConfig,
    validation: Validation,
}

impl TokenService {
    pub fn new(keys: Arc<KeyManager>, config: TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&config.audience);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "aud", "sub"]);

        Self {
            keys,
            config,
            validation,
        }
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let expires_at = now + self.config.access_token_ttl;

        let claims = Claims {
            sub: user_id,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4(),
            tenant_id,
            role,
            email: email.to_string(),
        };

        let token = self.keys.sign(&claims)?;
        Ok((token, expires_at))
    }

    /// Opaque and unsigned; it only means something through its stored digest.
    pub fn generate_refresh_token(&self) -> String {
        random_token()
    }

    /// Returns the pair and the digest of its refresh token.
    pub fn generate_token_pair(
        &self,
        user: &User,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<(TokenPair, String), AuthError> {
        let (access_token, expires_at) =
            self.generate_access_token(user.id, tenant_id, &user.email, role)?;
        let refresh_token = self.generate_refresh_token();
        let refresh_hash = token_digest(&refresh_token);

        let pair = TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            expires_at,
        };

        Ok((pair, refresh_hash))
    }

    /// Malformed, expired and invalid stay distinct so clients can react differently.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::TokenMalformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::TokenInvalid);
        }
        let key = self.keys.decoding_key(header.kid.as_deref())?;

        decode::<Claims>(token, &key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
                _ => AuthError::TokenInvalid,
            })
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.config.access_token_ttl
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.config.refresh_token_ttl
    }
}
