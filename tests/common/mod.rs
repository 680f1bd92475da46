#![allow(dead_code)]

use ring::{
    digest,
    rand::SystemRandom,
    signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING},
};
use simple_asn1::{oid, to_der, ASN1Block, ASN1Class, BigInt, BigUint, OID};
use std::io::{Cursor, Write};
use zip::write::{FileOptions, ZipWriter};
use zipverifierust::{
    crypto::DigestAlgorithm,
    manifest::entry_section,
    AttributeName, AttributeSet, Manifest, MANIFEST_NAME,
};

pub fn der(block: &ASN1Block) -> Vec<u8> {
    to_der(block).unwrap()
}

pub fn sequence(items: Vec<ASN1Block>) -> ASN1Block {
    ASN1Block::Sequence(0, items)
}

fn object(oid: OID) -> ASN1Block {
    ASN1Block::ObjectIdentifier(0, oid)
}

fn integer(value: i64) -> ASN1Block {
    ASN1Block::Integer(0, BigInt::from(value))
}

/// Constructed `[number]` around already-encoded content.
pub fn context(number: u32, content: Vec<u8>) -> ASN1Block {
    ASN1Block::Unknown(ASN1Class::ContextSpecific, true, 0, BigUint::from(number), content)
}

fn utc_time(value: &str) -> ASN1Block {
    let tag = BigUint::from(0x17u32);
    ASN1Block::Unknown(ASN1Class::Universal, false, 0, tag, value.as_bytes().to_vec())
}

fn attribute(oid: OID, value: ASN1Block) -> ASN1Block {
    sequence(vec![object(oid), ASN1Block::Set(0, vec![value])])
}

fn ecdsa_with_sha256() -> ASN1Block {
    sequence(vec![object(oid!(1, 2, 840, 10045, 4, 3, 2))])
}

/// A self-signed ECDSA P-256 identity producing PKCS#7 signature blocks.
pub struct TestSigner {
    key: EcdsaKeyPair,
    rng: SystemRandom,
    name: ASN1Block,
    serial: i64,
    pub cert_der: Vec<u8>,
}

impl TestSigner {
    pub fn new(common_name: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let key =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();

        let name = sequence(vec![ASN1Block::Set(
            0,
            vec![sequence(vec![
                object(oid!(2, 5, 4, 3)),
                ASN1Block::UTF8String(0, common_name.to_string()),
            ])],
        )]);
        let serial = 0x0123;
        let public_key = key.public_key().as_ref().to_vec();
        let tbs = sequence(vec![
            ASN1Block::Explicit(
                ASN1Class::ContextSpecific,
                0,
                BigUint::from(0u32),
                Box::new(integer(2)),
            ),
            integer(serial),
            ecdsa_with_sha256(),
            name.clone(),
            sequence(vec![utc_time("250101000000Z"), utc_time("450101000000Z")]),
            name.clone(),
            sequence(vec![
                sequence(vec![
                    object(oid!(1, 2, 840, 10045, 2, 1)),
                    object(oid!(1, 2, 840, 10045, 3, 1, 7)),
                ]),
                ASN1Block::BitString(0, public_key.len() * 8, public_key),
            ]),
        ]);
        let signature = key.sign(&rng, &der(&tbs)).unwrap().as_ref().to_vec();
        let cert_der = der(&sequence(vec![
            tbs,
            ecdsa_with_sha256(),
            ASN1Block::BitString(0, signature.len() * 8, signature),
        ]));

        Self {
            key,
            rng,
            name,
            serial,
            cert_der,
        }
    }

    pub fn cert_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.cert_der.clone()))
    }

    /// SignedData over `signature_file` with authenticated attributes.
    pub fn sign(&self, signature_file: &[u8]) -> Vec<u8> {
        self.sign_with(signature_file, true, &self.cert_der)
    }

    pub fn sign_with(
        &self,
        signature_file: &[u8],
        authenticated_attributes: bool,
        embedded_cert: &[u8],
    ) -> Vec<u8> {
        let sf_digest = digest::digest(&digest::SHA256, signature_file);
        let attributes = [
            der(&attribute(
                oid!(1, 2, 840, 113549, 1, 9, 3),
                object(oid!(1, 2, 840, 113549, 1, 7, 1)),
            )),
            der(&attribute(
                oid!(1, 2, 840, 113549, 1, 9, 4),
                ASN1Block::OctetString(0, sf_digest.as_ref().to_vec()),
            )),
        ]
        .concat();
        let signed_message = if authenticated_attributes {
            der(&ASN1Block::Unknown(
                ASN1Class::Universal,
                true,
                0,
                BigUint::from(0x11u32),
                attributes.clone(),
            ))
        } else {
            signature_file.to_vec()
        };
        let signature = self.key.sign(&self.rng, &signed_message).unwrap();

        let digest_algorithm = sequence(vec![object(oid!(2, 16, 840, 1, 101, 3, 4, 2, 1))]);
        let mut signer_info = vec![
            integer(1),
            sequence(vec![self.name.clone(), integer(self.serial)]),
            digest_algorithm.clone(),
        ];
        if authenticated_attributes {
            signer_info.push(context(0, attributes));
        }
        signer_info.push(ecdsa_with_sha256());
        signer_info.push(ASN1Block::OctetString(0, signature.as_ref().to_vec()));

        let signed_data = sequence(vec![
            integer(1),
            ASN1Block::Set(0, vec![digest_algorithm]),
            sequence(vec![object(oid!(1, 2, 840, 113549, 1, 7, 1))]),
            context(0, embedded_cert.to_vec()),
            ASN1Block::Set(0, vec![sequence(signer_info)]),
        ]);
        der(&sequence(vec![
            object(oid!(1, 2, 840, 113549, 1, 7, 2)),
            ASN1Block::Explicit(
                ASN1Class::ContextSpecific,
                0,
                BigUint::from(0u32),
                Box::new(signed_data),
            ),
        ]))
    }
}

fn name(s: &str) -> AttributeName {
    AttributeName::new(s).unwrap()
}

/// Manifest with a `SHA-256-Digest` per file.
pub fn manifest_for(files: &[(&str, &[u8])]) -> Manifest {
    let mut manifest = Manifest::new();
    manifest
        .main_attributes_mut()
        .put(AttributeName::manifest_version(), "1.0");
    manifest
        .main_attributes_mut()
        .put(name("Created-By"), "zipverifierust tests");
    for (file, content) in files {
        let mut attrs = AttributeSet::new();
        attrs.put(
            name("SHA-256-Digest"),
            DigestAlgorithm::Sha256.digest_base64(content),
        );
        manifest.insert_entry(*file, attrs);
    }
    manifest
}

/// Signature file for `manifest_bytes`: whole-manifest digest plus one
/// digest per parsed section.
pub fn signature_file_for(manifest_bytes: &[u8]) -> Vec<u8> {
    let manifest = Manifest::parse(manifest_bytes).unwrap();
    let mut sf = Manifest::new();
    sf.main_attributes_mut()
        .put(AttributeName::signature_version(), "1.0");
    sf.main_attributes_mut().put(
        name("SHA-256-Digest-Manifest"),
        DigestAlgorithm::Sha256.digest_base64(manifest_bytes),
    );
    for (entry, attrs) in manifest.entries() {
        let mut section = AttributeSet::new();
        section.put(
            name("SHA-256-Digest"),
            DigestAlgorithm::Sha256.digest_base64(&entry_section(entry, attrs)),
        );
        sf.insert_entry(entry, section);
    }
    sf.to_bytes()
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (entry, content) in entries {
        if entry.ends_with('/') {
            writer
                .add_directory(entry.trim_end_matches('/'), FileOptions::<()>::default())
                .unwrap();
        } else {
            writer.start_file(*entry, FileOptions::<()>::default()).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// A complete signed archive: manifest, `.SF`, `.EC` block and the files.
pub struct SignedJar {
    pub manifest: Vec<u8>,
    pub signature_file: Vec<u8>,
    pub block: Vec<u8>,
}

impl SignedJar {
    pub fn new(signer: &TestSigner, files: &[(&str, &[u8])]) -> Self {
        Self::from_manifest(signer, manifest_for(files).to_bytes())
    }

    pub fn from_manifest(signer: &TestSigner, manifest: Vec<u8>) -> Self {
        let signature_file = signature_file_for(&manifest);
        let block = signer.sign(&signature_file);
        Self {
            manifest,
            signature_file,
            block,
        }
    }

    /// Zip with metadata first, then `files` as given.
    pub fn zip(&self, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut entries: Vec<(&str, &[u8])> = Vec::new();
        entries.push(("META-INF/", &[]));
        entries.push((MANIFEST_NAME, self.manifest.as_slice()));
        entries.push(("META-INF/TEST.SF", self.signature_file.as_slice()));
        entries.push(("META-INF/TEST.EC", self.block.as_slice()));
        entries.extend_from_slice(files);
        zip_bytes(&entries)
    }
}
