//! Light-weight payload sniffers used by the batch analyzer

/// Extract question names from a DNS message (best effort)
///
/// Only the question section is walked; compression pointers end the name
/// since questions precede any pointer target.
pub fn sniff_dns_queries(payload: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    if payload.len() < 12 {
        return names;
    }
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]) as usize;
    if qdcount == 0 || qdcount > 16 {
        return names;
    }

    let mut pos = 12;
    for _ in 0..qdcount {
        let mut labels: Vec<String> = Vec::new();
        loop {
            let Some(&len) = payload.get(pos) else {
                return names;
            };
            if len == 0 {
                pos += 1;
                break;
            }
            if len & 0xC0 != 0 {
                // Compression pointer; question names should not have one
                return names;
            }
            let len = len as usize;
            let Some(label) = payload.get(pos + 1..pos + 1 + len) else {
                return names;
            };
            labels.push(String::from_utf8_lossy(label).into_owned());
            pos += 1 + len;
        }
        // Skip QTYPE + QCLASS
        pos += 4;
        if !labels.is_empty() {
            names.push(labels.join("."));
        }
    }
    names
}

/// TLS record header: handshake (0x16), TLS major 3, ClientHello (0x01)
pub fn looks_like_tls_client_hello(payload: &[u8]) -> bool {
    payload.len() >= 6 && payload[0] == 0x16 && payload[1] == 0x03 && payload[5] == 0x01
}

/// Shannon entropy of a byte slice, in bits per byte
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}
