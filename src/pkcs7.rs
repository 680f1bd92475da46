/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! PKCS#7 SignedData verification for `.RSA` / `.EC` signature blocks.
//!
//! The block is decoded with `simple_asn1`. Its blocks carry their byte
//! offset in the input, which recovers the exact encoding of the signer's
//! issuer, the embedded certificates and the authenticated attributes.
//! Certificates are read with `x509-parser` and signatures checked with
//! `ring`.

use crate::{
    certificate::{Certificate, CertificateChain, SignatureVerifier},
    crypto::DigestAlgorithm,
    error::SignatureError,
};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use simple_asn1::{ASN1Block, ASN1Class, BigInt, BigUint, OID};
use x509_parser::prelude::*;

const TAG_SET: u8 = 0x31;

fn malformed(msg: impl Into<String>) -> SignatureError {
    SignatureError::Malformed(msg.into())
}

/// `input[start..end]`, where the bounds are block offsets from one decode.
fn raw_span(input: &[u8], start: usize, end: usize) -> Result<&[u8], SignatureError> {
    input
        .get(start..end)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| malformed("element offsets out of range"))
}

/// The exact encoding of every top-level element in `data`.
fn split_elements(data: &[u8]) -> Result<Vec<&[u8]>, SignatureError> {
    let blocks = simple_asn1::from_der(data)?;
    let mut ends: Vec<usize> = blocks.iter().skip(1).map(ASN1Block::offset).collect();
    ends.push(data.len());
    blocks
        .iter()
        .zip(ends)
        .map(|(block, end)| raw_span(data, block.offset(), end))
        .collect()
}

fn is_context(block: &ASN1Block, number: u32) -> bool {
    match block {
        ASN1Block::Explicit(ASN1Class::ContextSpecific, _, tag, _)
        | ASN1Block::Unknown(ASN1Class::ContextSpecific, true, _, tag, _) => {
            *tag == BigUint::from(number)
        }
        _ => false,
    }
}

/// Children of an IMPLICIT `[n] SET OF`. One child decodes as `Explicit`,
/// several stay `Unknown` with the undecoded content.
fn implicit_children(block: &ASN1Block) -> Result<Vec<ASN1Block>, SignatureError> {
    match block {
        ASN1Block::Explicit(_, _, _, inner) => Ok(vec![inner.as_ref().clone()]),
        ASN1Block::Unknown(_, true, _, _, content) => Ok(simple_asn1::from_der(content)?),
        _ => Err(malformed("expected a constructed tagged element")),
    }
}

/// The algorithm OID of an AlgorithmIdentifier sequence.
fn algorithm_oid<'b>(block: &'b ASN1Block, what: &str) -> Result<&'b OID, SignatureError> {
    match block {
        ASN1Block::Sequence(_, items) => match items.first() {
            Some(ASN1Block::ObjectIdentifier(_, oid)) => Ok(oid),
            _ => Err(malformed(format!("{} has no algorithm identifier", what))),
        },
        _ => Err(malformed(format!("expected {}", what))),
    }
}

fn oid_signed_data() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 7, 2)
}

fn oid_message_digest() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 9, 4)
}

fn digest_for_oid(oid: &OID) -> Option<DigestAlgorithm> {
    if *oid == simple_asn1::oid!(1, 3, 14, 3, 2, 26) {
        Some(DigestAlgorithm::Sha1)
    } else if *oid == simple_asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 1) {
        Some(DigestAlgorithm::Sha256)
    } else if *oid == simple_asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 2) {
        Some(DigestAlgorithm::Sha384)
    } else if *oid == simple_asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 3) {
        Some(DigestAlgorithm::Sha512)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ecdsa,
}

/// Key family and, when the OID fixes it, the signature's hash.
fn signature_scheme(oid: &OID) -> Option<(KeyFamily, Option<DigestAlgorithm>)> {
    let rsa = |n: u64| simple_asn1::oid!(1, 2, 840, 113549, 1, 1, n);
    let ecdsa = |n: u64| simple_asn1::oid!(1, 2, 840, 10045, 4, 3, n);
    if *oid == rsa(1) {
        Some((KeyFamily::Rsa, None))
    } else if *oid == rsa(5) {
        Some((KeyFamily::Rsa, Some(DigestAlgorithm::Sha1)))
    } else if *oid == rsa(11) {
        Some((KeyFamily::Rsa, Some(DigestAlgorithm::Sha256)))
    } else if *oid == rsa(12) {
        Some((KeyFamily::Rsa, Some(DigestAlgorithm::Sha384)))
    } else if *oid == rsa(13) {
        Some((KeyFamily::Rsa, Some(DigestAlgorithm::Sha512)))
    } else if *oid == simple_asn1::oid!(1, 2, 840, 10045, 2, 1) {
        Some((KeyFamily::Ecdsa, None))
    } else if *oid == ecdsa(2) {
        Some((KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha256)))
    } else if *oid == ecdsa(3) {
        Some((KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha384)))
    } else {
        None
    }
}

fn verification_algorithm(
    family: KeyFamily,
    hash: DigestAlgorithm,
    public_key: &[u8],
) -> Result<&'static dyn VerificationAlgorithm, SignatureError> {
    let algorithm: &'static dyn VerificationAlgorithm = match family {
        KeyFamily::Rsa => match hash {
            DigestAlgorithm::Sha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            DigestAlgorithm::Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            DigestAlgorithm::Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            DigestAlgorithm::Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        },
        // Uncompressed points: 65 bytes for P-256, 97 for P-384.
        KeyFamily::Ecdsa => match (public_key.len(), hash) {
            (65, DigestAlgorithm::Sha256) => &signature::ECDSA_P256_SHA256_ASN1,
            (65, DigestAlgorithm::Sha384) => &signature::ECDSA_P256_SHA384_ASN1,
            (97, DigestAlgorithm::Sha256) => &signature::ECDSA_P384_SHA256_ASN1,
            (97, DigestAlgorithm::Sha384) => &signature::ECDSA_P384_SHA384_ASN1,
            _ => {
                return Err(SignatureError::Unsupported(format!(
                    "{:?} with {} for a {}-byte key",
                    family,
                    hash,
                    public_key.len()
                )))
            }
        },
    };
    Ok(algorithm)
}

struct SignerInfo<'a> {
    issuer: &'a [u8],
    serial: BigInt,
    digest_algorithm: OID,
    /// `[0] IMPLICIT` authenticated attributes, retagged as the SET that was signed.
    signed_attributes: Option<(Vec<u8>, Vec<ASN1Block>)>,
    signature_algorithm: OID,
    signature: Vec<u8>,
}

struct SignedData<'a> {
    certificates: Vec<Vec<u8>>,
    signer: SignerInfo<'a>,
}

impl<'a> SignedData<'a> {
    fn parse(block: &'a [u8]) -> Result<Self, SignatureError> {
        let blocks = simple_asn1::from_der(block)?;
        let Some(ASN1Block::Sequence(_, content_info)) = blocks.first() else {
            return Err(malformed("ContentInfo is not a sequence"));
        };
        let [ASN1Block::ObjectIdentifier(_, content_type), explicit, ..] = content_info.as_slice()
        else {
            return Err(malformed("ContentInfo lacks a content type and content"));
        };
        if *content_type != oid_signed_data() {
            return Err(SignatureError::Unsupported("content type is not signedData".into()));
        }
        let ASN1Block::Explicit(ASN1Class::ContextSpecific, _, _, signed_data) = explicit else {
            return Err(malformed("expected explicit signedData content"));
        };
        let ASN1Block::Sequence(_, fields) = signed_data.as_ref() else {
            return Err(malformed("signedData is not a sequence"));
        };
        let [ASN1Block::Integer(..), ASN1Block::Set(..), ASN1Block::Sequence(..), rest @ ..] =
            fields.as_slice()
        else {
            return Err(malformed(
                "signedData lacks version, digestAlgorithms or encapContentInfo",
            ));
        };

        let mut rest = rest;
        let mut certificates = Vec::new();
        if let Some((field, tail)) = rest.split_first().filter(|(f, _)| is_context(f, 0)) {
            certificates = Self::certificates(block, field, tail.first())?;
            rest = tail;
        }
        if let Some((_, tail)) = rest.split_first().filter(|(f, _)| is_context(f, 1)) {
            rest = tail;
        }

        let Some(ASN1Block::Set(_, infos)) = rest.first() else {
            return Err(malformed("expected signerInfos"));
        };
        let info = infos.first().ok_or_else(|| malformed("no signerInfo"))?;
        let signer = Self::parse_signer(block, info)?;

        Ok(Self {
            certificates,
            signer,
        })
    }

    /// DER of each certificate in the `[0] IMPLICIT` certificates field.
    fn certificates(
        input: &[u8],
        field: &ASN1Block,
        next: Option<&ASN1Block>,
    ) -> Result<Vec<Vec<u8>>, SignatureError> {
        match field {
            ASN1Block::Explicit(_, _, _, cert) => {
                let end = next
                    .map(ASN1Block::offset)
                    .ok_or_else(|| malformed("certificates are not followed by signerInfos"))?;
                Ok(vec![raw_span(input, cert.offset(), end)?.to_vec()])
            }
            ASN1Block::Unknown(_, true, _, _, content) => Ok(split_elements(content)?
                .into_iter()
                .map(<[u8]>::to_vec)
                .collect()),
            _ => Err(malformed("unexpected certificates encoding")),
        }
    }

    fn parse_signer(input: &'a [u8], info: &ASN1Block) -> Result<SignerInfo<'a>, SignatureError> {
        let ASN1Block::Sequence(_, fields) = info else {
            return Err(malformed("signerInfo is not a sequence"));
        };
        let [ASN1Block::Integer(..), sid, digest_algorithm, rest @ ..] = fields.as_slice() else {
            return Err(malformed("signerInfo is truncated"));
        };
        let ASN1Block::Sequence(_, sid) = sid else {
            return Err(SignatureError::Unsupported(
                "signer identified by subject key identifier".into(),
            ));
        };
        let [issuer @ ASN1Block::Sequence(..), ASN1Block::Integer(serial_offset, serial)] =
            sid.as_slice()
        else {
            return Err(malformed("expected issuerAndSerialNumber"));
        };
        let issuer = raw_span(input, issuer.offset(), *serial_offset)?;
        let digest_algorithm = algorithm_oid(digest_algorithm, "digestAlgorithm")?.clone();

        let mut rest = rest;
        let mut signed_attributes = None;
        if let Some((attributes, tail)) = rest.split_first().filter(|(f, _)| is_context(f, 0)) {
            let end = tail
                .first()
                .map(ASN1Block::offset)
                .ok_or_else(|| malformed("signerInfo lacks signatureAlgorithm"))?;
            let mut signed = raw_span(input, attributes.offset(), end)?.to_vec();
            signed[0] = TAG_SET;
            signed_attributes = Some((signed, implicit_children(attributes)?));
            rest = tail;
        }

        let [signature_algorithm, ASN1Block::OctetString(_, signature), ..] = rest else {
            return Err(malformed("signerInfo lacks signatureAlgorithm or signature"));
        };

        Ok(SignerInfo {
            issuer,
            serial: serial.clone(),
            digest_algorithm,
            signed_attributes,
            signature_algorithm: algorithm_oid(signature_algorithm, "signatureAlgorithm")?.clone(),
            signature: signature.clone(),
        })
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// The `messageDigest` value among the authenticated attributes.
fn message_digest(attributes: &[ASN1Block]) -> Result<&[u8], SignatureError> {
    for attribute in attributes {
        let ASN1Block::Sequence(_, fields) = attribute else {
            return Err(malformed("attribute is not a sequence"));
        };
        if let [ASN1Block::ObjectIdentifier(_, oid), ASN1Block::Set(_, values)] = fields.as_slice() {
            if *oid == oid_message_digest() {
                return match values.first() {
                    Some(ASN1Block::OctetString(_, digest)) => Ok(digest.as_slice()),
                    _ => Err(malformed("messageDigest is not an octet string")),
                };
            }
        }
    }
    Err(malformed("authenticated attributes lack messageDigest"))
}

/// Verifies PKCS#7 SignedData blocks with detached content.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pkcs7Verifier;

impl Pkcs7Verifier {
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for Pkcs7Verifier {
    fn verify(
        &self,
        signature_file: &[u8],
        signature_block: &[u8],
    ) -> Result<CertificateChain, SignatureError> {
        let signed = SignedData::parse(signature_block)?;
        let signer = &signed.signer;
        let serial = signer.serial.to_signed_bytes_be();

        let mut signer_index = None;
        for (i, der) in signed.certificates.iter().enumerate() {
            let (_, cert) = X509Certificate::from_der(der)
                .map_err(|e| SignatureError::Certificate(e.to_string()))?;
            if cert.tbs_certificate.issuer.as_raw() == signer.issuer
                && strip_leading_zeros(cert.tbs_certificate.raw_serial())
                    == strip_leading_zeros(&serial)
            {
                signer_index = Some(i);
                break;
            }
        }
        let signer_index = signer_index.ok_or(SignatureError::SignerNotFound)?;
        let signer_der = &signed.certificates[signer_index];

        let digest = digest_for_oid(&signer.digest_algorithm).ok_or_else(|| {
            SignatureError::Unsupported(format!("digest algorithm {:?}", signer.digest_algorithm))
        })?;
        let (family, implied_hash) =
            signature_scheme(&signer.signature_algorithm).ok_or_else(|| {
                SignatureError::Unsupported(format!(
                    "signature algorithm {:?}",
                    signer.signature_algorithm
                ))
            })?;

        let message: &[u8] = match &signer.signed_attributes {
            Some((signed, attributes)) => {
                if message_digest(attributes)? != digest.digest(signature_file).as_slice() {
                    return Err(SignatureError::BadSignature);
                }
                signed.as_slice()
            }
            None => signature_file,
        };

        let (_, cert) = X509Certificate::from_der(signer_der)
            .map_err(|e| SignatureError::Certificate(e.to_string()))?;
        let public_key = cert.public_key().subject_public_key.data.as_ref();
        let algorithm = verification_algorithm(family, implied_hash.unwrap_or(digest), public_key)?;
        UnparsedPublicKey::new(algorithm, public_key)
            .verify(message, &signer.signature)
            .map_err(|_| SignatureError::BadSignature)?;

        let mut chain = Vec::with_capacity(signed.certificates.len());
        chain.push(Certificate::from_der(signer_der.clone())?);
        for (i, der) in signed.certificates.iter().enumerate() {
            if i != signer_index {
                chain.push(Certificate::from_der(der.clone())?);
            }
        }
        tracing::debug!(subject = %chain[0].subject(), "signature block verified");
        Ok(CertificateChain::new(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octets(n: usize) -> ASN1Block {
        ASN1Block::OctetString(0, vec![9u8; n])
    }

    #[test]
    fn splits_elements_with_short_and_long_lengths() {
        let first = simple_asn1::to_der(&octets(3)).unwrap();
        let second = simple_asn1::to_der(&octets(300)).unwrap();
        let data = [first.as_slice(), second.as_slice()].concat();

        let parts = split_elements(&data).unwrap();
        assert_eq!(parts, vec![first.as_slice(), second.as_slice()]);
        assert_eq!(&parts[1][..4], &[0x04, 0x82, 0x01, 0x2c]);
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        assert!(matches!(
            split_elements(&[0x30, 0x05, 0x00]),
            Err(SignatureError::Asn1(_))
        ));
    }

    #[test]
    fn implicit_sets_decode_with_one_or_many_children() {
        let child = simple_asn1::to_der(&octets(2)).unwrap();
        let tagged = |content: Vec<u8>| {
            let der = simple_asn1::to_der(&ASN1Block::Unknown(
                ASN1Class::ContextSpecific,
                true,
                0,
                BigUint::from(0u32),
                content,
            ))
            .unwrap();
            simple_asn1::from_der(&der).unwrap().remove(0)
        };

        let one = tagged(child.clone());
        assert!(matches!(one, ASN1Block::Explicit(..)));
        assert!(is_context(&one, 0) && !is_context(&one, 1));
        assert_eq!(implicit_children(&one).unwrap().len(), 1);

        let many = tagged([child.clone(), child].concat());
        assert!(matches!(many, ASN1Block::Unknown(..)));
        assert!(is_context(&many, 0));
        assert_eq!(implicit_children(&many).unwrap().len(), 2);
    }

    #[test]
    fn decodes_algorithm_identifiers() {
        let der = simple_asn1::to_der(&ASN1Block::Sequence(
            0,
            vec![
                ASN1Block::ObjectIdentifier(0, simple_asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 1)),
                ASN1Block::Null(0),
            ],
        ))
        .unwrap();
        let block = simple_asn1::from_der(&der).unwrap().remove(0);
        let oid = algorithm_oid(&block, "digestAlgorithm").unwrap();
        assert_eq!(digest_for_oid(oid), Some(DigestAlgorithm::Sha256));
        assert!(algorithm_oid(&ASN1Block::Null(0), "digestAlgorithm").is_err());
    }

    #[test]
    fn garbage_blocks_are_rejected() {
        let err = Pkcs7Verifier.verify(b"sf", b"\x30\x03\x02\x01\x01").unwrap_err();
        assert!(matches!(err, SignatureError::Malformed(_)));
        assert!(Pkcs7Verifier.verify(b"sf", b"not der at all").is_err());
    }
}
