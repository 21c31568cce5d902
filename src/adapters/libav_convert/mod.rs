// LibAV convert adapter - Re-encode video and audio with libavformat/libavcodec

use crate::domain::convert::{ConversionStats, ConvertRequest, RateControl};
use crate::error::{ConvertError, ConvertResult};
use crate::ports::ConvertPort;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{self, Sample};
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::{codec, decoder, encoder, frame, media, ChannelLayout, Dictionary, Packet, Rational};
use std::path::Path;
use tracing::{debug, info, warn};

/// Samples per frame for audio encoders that do not fix a frame size
const DEFAULT_AUDIO_FRAME_SIZE: usize = 1024;

/// Transcoder for the best video stream and the best audio stream of a file.
///
/// Video frames are converted to the encoder's first supported pixel format.
/// Audio is resampled to the encoder's first supported sample format, mono
/// for mono sources and stereo otherwise, and regrouped into frames of the
/// encoder's frame size. Other streams are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibavConverter;

impl ConvertPort for LibavConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConvertRequest,
    ) -> ConvertResult<ConversionStats> {
        let mut ictx = format::input(&input).map_err(ConvertError::libav("open input"))?;
        let mut octx = format::output(&output).map_err(ConvertError::libav("create output"))?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        let mut video = VideoLane::open(&ictx, &mut octx, request, global_header, input)?;
        let mut audio = AudioLane::open(&ictx, &mut octx, request, global_header)?;
        if audio.is_none() {
            info!("No audio stream in {}, writing video only", input.display());
        }

        octx.write_header().map_err(ConvertError::libav("write header"))?;
        // The muxer may replace the stream time bases while writing the header
        video.output_time_base = stream_time_base(&octx, video.output_index, video.encoder_time_base);
        if let Some(audio) = audio.as_mut() {
            audio.output_time_base = stream_time_base(&octx, audio.output_index, audio.time_base);
        }

        for (stream, packet) in ictx.packets() {
            let index = stream.index();
            if index == video.input_index {
                video.decode(&packet, &mut octx)?;
            } else if let Some(audio) = audio.as_mut().filter(|a| a.input_index == index) {
                audio.decode(&packet, &mut octx)?;
            }
        }

        video.finish(&mut octx)?;
        if let Some(audio) = audio.as_mut() {
            audio.finish(&mut octx)?;
        }
        octx.write_trailer().map_err(ConvertError::libav("write trailer"))?;

        let (audio_frames, audio_bytes) = audio.as_ref().map_or((0, 0), |a| (a.frames, a.bytes));
        Ok(ConversionStats {
            video_frames: video.frames,
            audio_frames,
            bytes_written: video.bytes + audio_bytes,
        })
    }
}

/// Decoder, encoder and output stream for the video track
struct VideoLane {
    input_index: usize,
    input_time_base: Rational,
    decoder: decoder::Video,
    encoder: encoder::Video,
    encoder_time_base: Rational,
    scaler: Option<scaling::Context>,
    output_index: usize,
    output_time_base: Rational,
    frames: u64,
    bytes: u64,
}

impl VideoLane {
    fn open(
        ictx: &format::context::Input,
        octx: &mut format::context::Output,
        request: &ConvertRequest,
        global_header: bool,
        path: &Path,
    ) -> ConvertResult<Self> {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| ConvertError::NoVideoStream {
                path: path.display().to_string(),
            })?;
        let input_index = stream.index();
        let input_time_base = stream.time_base();
        let frame_rate = stream.avg_frame_rate();

        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .map_err(ConvertError::libav("read video parameters"))?
            .decoder()
            .video()
            .map_err(ConvertError::libav("open video decoder"))?;

        let codec_id = request.video_codec();
        let codec = encoder::find(codec_id).ok_or_else(|| ConvertError::EncoderNotFound {
            codec: format!("{:?}", codec_id),
        })?;
        let pixel = codec
            .video()
            .ok()
            .and_then(|video| video.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(decoder.format());

        let encoder_time_base = if frame_rate.numerator() > 0 && frame_rate.denominator() > 0 {
            frame_rate.invert()
        } else {
            input_time_base
        };

        let mut settings = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(ConvertError::libav("create video encoder"))?;
        settings.set_width(decoder.width());
        settings.set_height(decoder.height());
        settings.set_aspect_ratio(decoder.aspect_ratio());
        settings.set_format(pixel);
        settings.set_time_base(encoder_time_base);
        if frame_rate.numerator() > 0 {
            settings.set_frame_rate(Some(frame_rate));
        }
        if global_header {
            settings.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        match request.rate_control() {
            RateControl::EncoderDefault => {}
            RateControl::Bitrate(bitrate) => settings.set_bit_rate(bitrate as usize),
            RateControl::Crf { crf, preset } => {
                options.set("crf", &crf.to_string());
                options.set("preset", preset);
                settings.set_bit_rate(0);
            }
        }
        debug!(
            "Video encoder {:?}: {}x{} {:?}, time base {}",
            codec_id,
            decoder.width(),
            decoder.height(),
            pixel,
            encoder_time_base
        );
        let encoder = settings
            .open_with(options)
            .map_err(ConvertError::libav("open video encoder"))?;

        let output_index = {
            let mut stream = octx
                .add_stream(codec)
                .map_err(ConvertError::libav("add video stream"))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };

        let scaler = if decoder.format() != pixel {
            debug!("Converting video from {:?} to {:?}", decoder.format(), pixel);
            Some(
                scaling::Context::get(
                    decoder.format(),
                    decoder.width(),
                    decoder.height(),
                    pixel,
                    decoder.width(),
                    decoder.height(),
                    scaling::Flags::BICUBIC,
                )
                .map_err(ConvertError::libav("create video scaler"))?,
            )
        } else {
            None
        };

        Ok(Self {
            input_index,
            input_time_base,
            decoder,
            encoder,
            encoder_time_base,
            scaler,
            output_index,
            output_time_base: encoder_time_base,
            frames: 0,
            bytes: 0,
        })
    }

    fn decode(&mut self, packet: &Packet, octx: &mut format::context::Output) -> ConvertResult<()> {
        if let Err(e) = self.decoder.send_packet(packet) {
            warn!("Skipping undecodable video packet: {}", e);
            return Ok(());
        }
        self.drain_decoder(octx)
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        self.decoder
            .send_eof()
            .map_err(ConvertError::libav("flush video decoder"))?;
        self.drain_decoder(octx)?;
        self.encoder
            .send_eof()
            .map_err(ConvertError::libav("flush video encoder"))?;
        self.drain_encoder(octx)
    }

    fn drain_decoder(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        let mut decoded = frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let pts = decoded
                .timestamp()
                .map(|ts| rescale_ts(ts, self.input_time_base, self.encoder_time_base));

            if let Some(scaler) = self.scaler.as_mut() {
                let mut converted = frame::Video::empty();
                scaler
                    .run(&decoded, &mut converted)
                    .map_err(ConvertError::libav("convert video frame"))?;
                converted.set_pts(pts);
                self.encoder
                    .send_frame(&converted)
                    .map_err(ConvertError::libav("encode video"))?;
            } else {
                decoded.set_pts(pts);
                decoded.set_kind(ffmpeg::picture::Type::None);
                self.encoder
                    .send_frame(&decoded)
                    .map_err(ConvertError::libav("encode video"))?;
            }
            self.frames += 1;
            self.drain_encoder(octx)?;
        }
        Ok(())
    }

    fn drain_encoder(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_index);
            packet.rescale_ts(self.encoder_time_base, self.output_time_base);
            self.bytes += packet.size() as u64;
            packet
                .write_interleaved(octx)
                .map_err(ConvertError::libav("write video packet"))?;
        }
        Ok(())
    }
}

/// Decoder, resampler, encoder and output stream for the audio track
struct AudioLane {
    input_index: usize,
    decoder: decoder::Audio,
    resampler: resampling::Context,
    fifo: SampleFifo,
    encoder: encoder::Audio,
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
    time_base: Rational,
    frame_size: usize,
    next_pts: i64,
    output_index: usize,
    output_time_base: Rational,
    frames: u64,
    bytes: u64,
}

impl AudioLane {
    fn open(
        ictx: &format::context::Input,
        octx: &mut format::context::Output,
        request: &ConvertRequest,
        global_header: bool,
    ) -> ConvertResult<Option<Self>> {
        let Some(stream) = ictx.streams().best(media::Type::Audio) else {
            return Ok(None);
        };
        let input_index = stream.index();

        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .map_err(ConvertError::libav("read audio parameters"))?
            .decoder()
            .audio()
            .map_err(ConvertError::libav("open audio decoder"))?;

        let codec_id = request.audio_codec();
        let codec = encoder::find(codec_id).ok_or_else(|| ConvertError::EncoderNotFound {
            codec: format!("{:?}", codec_id),
        })?;
        let format = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(format::sample::Type::Planar));
        let layout = if decoder.channels() == 1 {
            ChannelLayout::MONO
        } else {
            ChannelLayout::STEREO
        };
        let rate = decoder.rate();
        let time_base = Rational::new(1, rate as i32);

        let mut settings = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(ConvertError::libav("create audio encoder"))?;
        settings.set_rate(rate as i32);
        settings.set_channel_layout(layout);
        settings.set_format(format);
        settings.set_bit_rate(request.audio_bitrate() as usize);
        settings.set_time_base(time_base);
        if global_header {
            settings.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        debug!(
            "Audio encoder {:?}: {} Hz {:?} at {} bps",
            codec_id,
            rate,
            format,
            request.audio_bitrate()
        );
        let encoder = settings
            .open()
            .map_err(ConvertError::libav("open audio encoder"))?;

        let frame_size = match encoder.frame_size() {
            0 => DEFAULT_AUDIO_FRAME_SIZE,
            size => size as usize,
        };

        let output_index = {
            let mut stream = octx
                .add_stream(codec)
                .map_err(ConvertError::libav("add audio stream"))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
            stream.index()
        };

        let resampler = resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            format,
            layout,
            rate,
        )
        .map_err(ConvertError::libav("create audio resampler"))?;

        let channels = layout.channels().max(1) as usize;
        let fifo = if format.is_planar() {
            SampleFifo::new(channels, format.bytes())
        } else {
            SampleFifo::new(1, format.bytes() * channels)
        };

        Ok(Some(Self {
            input_index,
            decoder,
            resampler,
            fifo,
            encoder,
            format,
            layout,
            rate,
            time_base,
            frame_size,
            next_pts: 0,
            output_index,
            output_time_base: time_base,
            frames: 0,
            bytes: 0,
        }))
    }

    fn decode(&mut self, packet: &Packet, octx: &mut format::context::Output) -> ConvertResult<()> {
        if let Err(e) = self.decoder.send_packet(packet) {
            warn!("Skipping undecodable audio packet: {}", e);
            return Ok(());
        }
        self.drain_decoder(octx)
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        self.decoder
            .send_eof()
            .map_err(ConvertError::libav("flush audio decoder"))?;
        self.drain_decoder(octx)?;

        let buffered = self
            .resampler
            .delay()
            .map_or(0, |delay| delay.output.max(0) as usize);
        if buffered > 0 {
            let mut tail = frame::Audio::new(self.format, buffered, self.layout);
            match self.resampler.flush(&mut tail) {
                Ok(_) => self.queue(&tail),
                Err(e) => debug!("Dropping {} buffered audio samples: {}", buffered, e),
            }
        }

        while let Some(planes) = self.fifo.pop(self.frame_size) {
            self.encode(planes, octx)?;
        }
        if let Some(planes) = self.fifo.pop_remaining() {
            self.encode(planes, octx)?;
        }

        self.encoder
            .send_eof()
            .map_err(ConvertError::libav("flush audio encoder"))?;
        self.drain_encoder(octx)
    }

    fn drain_decoder(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        let mut decoded = frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let mut resampled = frame::Audio::empty();
            self.resampler
                .run(&decoded, &mut resampled)
                .map_err(ConvertError::libav("resample audio"))?;
            self.queue(&resampled);

            while let Some(planes) = self.fifo.pop(self.frame_size) {
                self.encode(planes, octx)?;
            }
        }
        Ok(())
    }

    fn queue(&mut self, resampled: &frame::Audio) {
        let used = resampled.samples() * self.fifo.unit();
        let planes: Vec<&[u8]> = (0..self.fifo.planes())
            .map(|plane| &resampled.data(plane)[..used])
            .collect();
        self.fifo.push(&planes);
    }

    fn encode(&mut self, planes: Vec<Vec<u8>>, octx: &mut format::context::Output) -> ConvertResult<()> {
        let samples = planes.first().map_or(0, |plane| plane.len() / self.fifo.unit());
        let mut chunk = frame::Audio::new(self.format, samples, self.layout);
        chunk.set_rate(self.rate);
        for (index, plane) in planes.iter().enumerate() {
            chunk.data_mut(index)[..plane.len()].copy_from_slice(plane);
        }
        chunk.set_pts(Some(self.next_pts));
        self.next_pts += samples as i64;

        self.encoder
            .send_frame(&chunk)
            .map_err(ConvertError::libav("encode audio"))?;
        self.frames += 1;
        self.drain_encoder(octx)
    }

    fn drain_encoder(&mut self, octx: &mut format::context::Output) -> ConvertResult<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_index);
            packet.rescale_ts(self.time_base, self.output_time_base);
            self.bytes += packet.size() as u64;
            packet
                .write_interleaved(octx)
                .map_err(ConvertError::libav("write audio packet"))?;
        }
        Ok(())
    }
}

/// Byte queue per audio plane, used to regroup decoded samples into frames
/// of the size the encoder expects
#[derive(Debug)]
struct SampleFifo {
    planes: Vec<Vec<u8>>,
    /// Bytes one sample occupies in one plane
    unit: usize,
}

impl SampleFifo {
    fn new(planes: usize, unit: usize) -> Self {
        Self {
            planes: vec![Vec::new(); planes.max(1)],
            unit: unit.max(1),
        }
    }

    fn planes(&self) -> usize {
        self.planes.len()
    }

    fn unit(&self) -> usize {
        self.unit
    }

    /// Buffered samples per plane
    fn len(&self) -> usize {
        self.planes[0].len() / self.unit
    }

    fn push(&mut self, planes: &[&[u8]]) {
        for (queue, data) in self.planes.iter_mut().zip(planes) {
            queue.extend_from_slice(data);
        }
    }

    /// Take exactly `samples` samples, or nothing if fewer are buffered
    fn pop(&mut self, samples: usize) -> Option<Vec<Vec<u8>>> {
        if samples == 0 || self.len() < samples {
            return None;
        }
        let bytes = samples * self.unit;
        Some(
            self.planes
                .iter_mut()
                .map(|queue| queue.drain(..bytes).collect())
                .collect(),
        )
    }

    /// Take whatever is left
    fn pop_remaining(&mut self) -> Option<Vec<Vec<u8>>> {
        let samples = self.len();
        self.pop(samples)
    }
}

/// Rescale a timestamp between time bases, rounding toward zero
fn rescale_ts(ts: i64, from: Rational, to: Rational) -> i64 {
    if from == to {
        return ts;
    }
    let num = ts as i128 * from.numerator() as i128 * to.denominator() as i128;
    let den = from.denominator() as i128 * to.numerator() as i128;
    if den == 0 {
        return ts;
    }
    (num / den) as i64
}

fn stream_time_base(octx: &format::context::Output, index: usize, fallback: Rational) -> Rational {
    octx.stream(index)
        .map(|stream| stream.time_base())
        .unwrap_or(fallback)
}
