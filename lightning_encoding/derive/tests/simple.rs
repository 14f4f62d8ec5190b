#[allow(dead_code)]
#[macro_use]
extern crate lightning_encoding_derive;

#[derive(LightningEncode, LightningDecode)]
struct Me(u8);

#[derive(LightningEncode, LightningDecode)]
#[lightning_encoding(use_tlv)]
struct One {
    a: Vec<u8>,

    #[lightning_encoding(tlv = 1)]
    b: Option<u16>,

    #[lightning_encoding(unknown_tlvs)]
    c: std::collections::BTreeMap<usize, Box<[u8]>>,
}

#[derive(LightningEncode, LightningDecode)]
struct Heap(Box<[u8]>);

#[derive(LightningEncode, LightningDecode)]
struct You {
    //    a: (),
    b: Vec<u8>,
}

#[derive(LightningEncode, LightningDecode)]
struct Other {
    //    a: (),
    b: u8,
}

fn main() {}
