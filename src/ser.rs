use crate::{
    ecc::{fr_from_bytes, fr_to_bytes, g_from_bytes, g_to_bytes},
    errors::PodError,
    types::{
        Claim, Digest, Path, Range, Receipt, Request, Response, Secret, DIGEST_LEN, POINT_LEN,
        RECEIPT_LEN, SCALAR_LEN,
    },
};

const RANGE_LEN: usize = 16;

#[inline]
#[must_use]
pub const fn le64(x: u64) -> [u8; 8] {
    x.to_le_bytes()
}

/// Cursor over an input buffer. Every read is bounds-checked.
struct Reader<'a> {
    b: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    const fn new(b: &'a [u8]) -> Self {
        Self { b, off: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], PodError> {
        let end = self.off.checked_add(n).ok_or(PodError::Decode(what))?;
        let out = self.b.get(self.off..end).ok_or(PodError::Decode(what))?;
        self.off = end;
        Ok(out)
    }

    fn array32(&mut self, what: &'static str) -> Result<[u8; 32], PodError> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32, what)?);
        Ok(out)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, PodError> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(out))
    }

    /// Element count, checked against what is left so a hostile prefix
    /// cannot trigger a huge allocation.
    fn len(&mut self, item: usize, what: &'static str) -> Result<usize, PodError> {
        let n = usize::try_from(self.u64(what)?).map_err(|_| PodError::Decode(what))?;
        let need = n.checked_mul(item).ok_or(PodError::Decode(what))?;
        let left = self.b.len() - self.off;
        if need > left {
            return Err(PodError::InvalidLength { expected: need, got: left });
        }
        Ok(n)
    }

    fn finish(self) -> Result<(), PodError> {
        if self.off == self.b.len() {
            Ok(())
        } else {
            Err(PodError::Decode("trailing bytes"))
        }
    }
}

fn put_len(v: &mut Vec<u8>, n: usize) {
    v.extend_from_slice(&le64(n as u64));
}

fn put_range(v: &mut Vec<u8>, r: &Range) {
    v.extend_from_slice(&le64(r.start));
    v.extend_from_slice(&le64(r.count));
}

fn read_range(r: &mut Reader<'_>) -> Result<Range, PodError> {
    let start = r.u64("short range")?;
    let count = r.u64("short range")?;
    Ok(Range { start, count })
}

fn put_path(v: &mut Vec<u8>, path: &[Digest]) {
    put_len(v, path.len());
    for d in path {
        v.extend_from_slice(d);
    }
}

fn read_path(r: &mut Reader<'_>) -> Result<Path, PodError> {
    let n = r.len(DIGEST_LEN, "short path")?;
    (0..n).map(|_| r.array32("short path")).collect()
}

/// `LE64(start)` || `LE64(count)`
#[must_use]
pub fn encode_range(range: &Range) -> [u8; RANGE_LEN] {
    let mut out = [0u8; RANGE_LEN];
    out[..8].copy_from_slice(&le64(range.start));
    out[8..].copy_from_slice(&le64(range.count));
    out
}

/// # Errors
/// `InvalidLength` unless the input is exactly 16 bytes.
pub fn decode_range(b: &[u8]) -> Result<Range, PodError> {
    if b.len() != RANGE_LEN {
        return Err(PodError::InvalidLength { expected: RANGE_LEN, got: b.len() });
    }
    let mut r = Reader::new(b);
    let range = read_range(&mut r)?;
    r.finish()?;
    Ok(range)
}

/// `seed2_seed` || `LE64(len)` || len * range
#[must_use]
pub fn encode_request(req: &Request) -> Vec<u8> {
    let mut v = Vec::with_capacity(DIGEST_LEN + 8 + req.demands.len() * RANGE_LEN);
    v.extend_from_slice(&req.seed2_seed);
    put_len(&mut v, req.demands.len());
    for r in &req.demands {
        put_range(&mut v, r);
    }
    v
}

/// # Errors
/// `Decode` on short input or trailing bytes, `InvalidLength` if the
/// declared range count exceeds the input.
pub fn decode_request(b: &[u8]) -> Result<Request, PodError> {
    let mut r = Reader::new(b);
    let seed2_seed = r.array32("short request")?;
    let n = r.len(RANGE_LEN, "short request")?;
    let demands = (0..n).map(|_| read_range(&mut r)).collect::<Result<Vec<_>, _>>()?;
    r.finish()?;
    Ok(Request { seed2_seed, demands })
}

/// `LE64(len)` || len * compressed k || `LE64(len)` || len * m
#[must_use]
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut v = Vec::with_capacity(16 + resp.k.len() * POINT_LEN + resp.m.len() * SCALAR_LEN);
    put_len(&mut v, resp.k.len());
    for k in &resp.k {
        v.extend_from_slice(&g_to_bytes(k));
    }
    put_len(&mut v, resp.m.len());
    for m in &resp.m {
        v.extend_from_slice(&fr_to_bytes(m));
    }
    v
}

/// # Errors
/// `Decode` for short input, invalid point or non-canonical scalar
/// encodings, and trailing bytes.
pub fn decode_response(b: &[u8]) -> Result<Response, PodError> {
    let mut r = Reader::new(b);
    let nk = r.len(POINT_LEN, "short response")?;
    let k = (0..nk)
        .map(|_| g_from_bytes(&r.array32("short response")?).ok_or(PodError::Decode("invalid point")))
        .collect::<Result<Vec<_>, _>>()?;
    let nm = r.len(SCALAR_LEN, "short response")?;
    let m = (0..nm)
        .map(|_| fr_from_bytes(&r.array32("short response")?).ok_or(PodError::Decode("non-canonical scalar")))
        .collect::<Result<Vec<_>, _>>()?;
    r.finish()?;
    Ok(Response { k, m })
}

/// `seed2` || `k_mkl_root` || `LE64(count)` (72 bytes)
#[must_use]
pub fn encode_receipt(receipt: &Receipt) -> [u8; RECEIPT_LEN] {
    let mut out = [0u8; RECEIPT_LEN];
    out[..32].copy_from_slice(&receipt.seed2);
    out[32..64].copy_from_slice(&receipt.k_mkl_root);
    out[64..].copy_from_slice(&le64(receipt.count));
    out
}

/// # Errors
/// `InvalidLength` unless the input is exactly 72 bytes.
pub fn decode_receipt(b: &[u8]) -> Result<Receipt, PodError> {
    if b.len() != RECEIPT_LEN {
        return Err(PodError::InvalidLength { expected: RECEIPT_LEN, got: b.len() });
    }
    let mut r = Reader::new(b);
    let seed2 = r.array32("short receipt")?;
    let k_mkl_root = r.array32("short receipt")?;
    let count = r.u64("short receipt")?;
    r.finish()?;
    Ok(Receipt { seed2, k_mkl_root, count })
}

#[must_use]
pub const fn encode_secret(secret: &Secret) -> [u8; DIGEST_LEN] {
    secret.seed0
}

/// # Errors
/// `InvalidLength` unless the input is exactly 32 bytes.
pub fn decode_secret(b: &[u8]) -> Result<Secret, PodError> {
    let seed0: [u8; DIGEST_LEN] = b
        .try_into()
        .map_err(|_| PodError::InvalidLength { expected: DIGEST_LEN, got: b.len() })?;
    Ok(Secret { seed0 })
}

/// `LE64(i)` || `LE64(j)` || compressed kij || path
#[must_use]
pub fn encode_claim(claim: &Claim) -> Vec<u8> {
    let mut v = Vec::with_capacity(16 + POINT_LEN + 8 + claim.mkl_path.len() * DIGEST_LEN);
    v.extend_from_slice(&le64(claim.i));
    v.extend_from_slice(&le64(claim.j));
    v.extend_from_slice(&g_to_bytes(&claim.kij));
    put_path(&mut v, &claim.mkl_path);
    v
}

/// # Errors
/// `Decode` for short input, an invalid point encoding or trailing bytes.
pub fn decode_claim(b: &[u8]) -> Result<Claim, PodError> {
    let mut r = Reader::new(b);
    let i = r.u64("short claim")?;
    let j = r.u64("short claim")?;
    let kij = g_from_bytes(&r.array32("short claim")?).ok_or(PodError::Decode("invalid point"))?;
    let mkl_path = read_path(&mut r)?;
    r.finish()?;
    Ok(Claim { i, j, kij, mkl_path })
}

/// Canonical path: `LE64(count)` || count * 32-byte nodes
#[must_use]
pub fn encode_merkle_path(path: &[Digest]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + path.len() * DIGEST_LEN);
    put_path(&mut v, path);
    v
}

/// # Errors
/// `Decode` on short input or trailing bytes, `InvalidLength` if the
/// declared node count does not fit the input.
pub fn decode_merkle_path(b: &[u8]) -> Result<Path, PodError> {
    let mut r = Reader::new(b);
    let path = read_path(&mut r)?;
    r.finish()?;
    Ok(path)
}
