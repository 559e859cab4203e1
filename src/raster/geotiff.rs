//! GeoTIFF encoding of single band Float32 rasters.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use ndarray::Array2;
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

use super::{GeoKeys, GeoTransform, Raster, RasterMeta};
use crate::error::RainError;

pub fn read(path: &Path) -> Result<Raster, RainError> {
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let transform = read_transform(&mut decoder)?;
    let crs = GeoKeys {
        directory: decoder
            .find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?
            .unwrap_or_default(),
        doubles: find_f64s(&mut decoder, Tag::GeoDoubleParamsTag)?.unwrap_or_default(),
        ascii: find_ascii(&mut decoder, Tag::GeoAsciiParamsTag)?,
    };
    let nodata = find_ascii(&mut decoder, Tag::GdalNodata)?
        .and_then(|s| s.trim().parse::<f32>().ok());

    let data = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf,
        _ => {
            return Err(RainError::Unsupported(format!(
                "{:?} is not a Float32 raster",
                path
            )))
        }
    };
    if data.len() != width * height {
        return Err(RainError::Unsupported(format!(
            "{:?} has more than one band",
            path
        )));
    }

    let meta = RasterMeta {
        width,
        height,
        transform,
        crs,
        nodata,
    };
    Raster::new(meta, Array2::from_shape_vec((height, width), data)?)
}

pub fn write(raster: &Raster, path: &Path) -> Result<(), RainError> {
    let meta = &raster.meta;
    let t = meta.transform.0;
    if !meta.transform.is_north_up() {
        return Err(RainError::Unsupported(
            "rotated transforms cannot be written".to_string(),
        ));
    }

    let mut file = BufWriter::new(File::create(path)?);
    {
        let mut encoder = TiffEncoder::new(&mut file)?;
        let mut image =
            encoder.new_image::<colortype::Gray32Float>(meta.width as u32, meta.height as u32)?;

        let tags = image.encoder();
        tags.write_tag(Tag::ModelPixelScaleTag, &[t[1], -t[5], 0.0][..])?;
        tags.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, t[0], t[3], 0.0][..])?;
        if !meta.crs.directory.is_empty() {
            tags.write_tag(Tag::GeoKeyDirectoryTag, &meta.crs.directory[..])?;
        }
        if !meta.crs.doubles.is_empty() {
            tags.write_tag(Tag::GeoDoubleParamsTag, &meta.crs.doubles[..])?;
        }
        if let Some(ascii) = &meta.crs.ascii {
            tags.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
        }
        if let Some(nodata) = meta.nodata {
            tags.write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
        }

        let data: Vec<f32> = raster.data.iter().copied().collect();
        image.write_data(&data)?;
    }
    file.flush()?;

    Ok(())
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, RainError> {
    let scale = find_f64s(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = find_f64s(decoder, Tag::ModelTiepointTag)?;
    let matrix = find_f64s(decoder, Tag::ModelTransformationTag)?;

    match (scale, tiepoint, matrix) {
        (Some(s), Some(tp), _) if s.len() >= 2 && tp.len() >= 6 => Ok(GeoTransform::new(
            tp[3] - tp[0] * s[0],
            s[0],
            tp[4] + tp[1] * s[1],
            -s[1],
        )),
        (_, _, Some(m)) if m.len() == 16 => Ok(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]])),
        _ => Err(RainError::Unsupported(
            "raster carries no georeferencing".to_string(),
        )),
    }
}

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>, RainError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()?)
}

fn find_ascii<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<String>, RainError> {
    let value = decoder.find_tag(tag)?.map(|v| v.into_string()).transpose()?;
    Ok(value.map(|s| s.trim_end_matches('\0').to_string()))
}

// -- Tests -------------------------------------------------------------------
