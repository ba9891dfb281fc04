#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

pub fn raw_rgb_image(width: u32, height: u32) -> Stream {
    let mut content = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            content.extend_from_slice(&[(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8]);
        }
    }
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        content,
    )
}

pub fn raw_gray_image(width: u32, height: u32) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![128; (width * height) as usize],
    )
}

pub const CORRUPT_JPEG: &[u8] = b"\xFF\xD8 this is not really a jpeg";

pub fn corrupt_jpeg_image() -> Stream {
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 32,
            "Height" => 32,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        CORRUPT_JPEG.to_vec(),
    );
    stream.allows_compression = false;
    stream
}

/// One page per entry; each page draws every image listed for it.
pub fn build_pdf(pages: Vec<Vec<Stream>>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for images in pages {
        let mut xobjects = lopdf::Dictionary::new();
        let mut ops = String::new();
        for (i, image) in images.into_iter().enumerate() {
            let name = format!("Im{}", i + 1);
            let image_id = doc.add_object(image);
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
            ops.push_str(&format!("q 100 0 0 100 0 {} cm /{} Do Q\n", i * 110, name));
        }
        let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), ops.into_bytes()));
        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn save(doc: &mut Document, path: &Path) {
    doc.save(path).expect("save fixture pdf");
}

pub fn pdf_bytes(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize fixture pdf");
    out
}

/// Image streams of a saved document, by page order.
pub fn page_images(doc: &Document) -> Vec<(ObjectId, Stream)> {
    pdf_shrink::strategy::page_image_ids(doc)
        .into_iter()
        .map(|id| match doc.get_object(id) {
            Ok(Object::Stream(stream)) => (id, stream.clone()),
            other => panic!("image {:?} is not a stream: {:?}", id, other),
        })
        .collect()
}

pub fn filter_of(stream: &Stream) -> Option<Vec<u8>> {
    stream
        .dict
        .get(b"Filter")
        .ok()
        .and_then(|f| f.as_name().ok())
        .map(<[u8]>::to_vec)
}

pub fn dims_of(stream: &Stream) -> (i64, i64) {
    (
        stream.dict.get(b"Width").unwrap().as_i64().unwrap(),
        stream.dict.get(b"Height").unwrap().as_i64().unwrap(),
    )
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Writes an executable shell script standing in for Ghostscript.
#[cfg(unix)]
pub fn fake_engine(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake engine that copies its input to `-sOutputFile` and logs its
/// arguments, one per line, to `args_log`.
#[cfg(unix)]
pub fn copying_engine(dir: &Path, args_log: &Path) -> PathBuf {
    let body = format!(
        r#"printf '%s\n' "$@" > '{log}'
for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) out="${{arg#-sOutputFile=}}" ;;
  esac
  last="$arg"
done
cp "$last" "$out"
"#,
        log = args_log.display()
    );
    fake_engine(dir, "gs-copy", &body)
}
