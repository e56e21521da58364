use crate::afc::{OscillatorId, OscillatorReadout};
use crate::monitor::{ReceiverMonitor, ReceiverStatus, TransmitterFault, TransmitterStatusSource};
use crate::prelude::{DrxError, DrxResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds the periodic status document from the transmitter and receiver
/// monitors plus the oscillator readout.
pub struct StatusAggregator {
    transmitter: Arc<dyn TransmitterStatusSource>,
    receiver: Arc<dyn ReceiverMonitor>,
    oscillators: OscillatorReadout,
    interval: Duration,
    last_sent: Option<Instant>,
}

fn write_event<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> DrxResult<()> {
    writer
        .write_event(event)
        .map_err(|err| DrxError::Wire(format!("status xml: {err}")))
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> DrxResult<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(value)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

impl StatusAggregator {
    pub fn new(
        transmitter: Arc<dyn TransmitterStatusSource>,
        receiver: Arc<dyn ReceiverMonitor>,
        oscillators: OscillatorReadout,
        interval: Duration,
    ) -> Self {
        Self {
            transmitter,
            receiver,
            oscillators,
            interval,
            last_sent: None,
        }
    }

    /// True once per interval; the first call is always due.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }

    pub fn receiver_status(&self) -> ReceiverStatus {
        self.receiver.receiver_status()
    }

    pub fn build_xml(&self) -> DrxResult<String> {
        let xmit = self.transmitter.transmitter_status();
        let rcvr = self.receiver.receiver_status();

        let mut writer = Writer::new(Vec::new());
        write_event(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        write_event(&mut writer, Event::Start(BytesStart::new("KaStatus")))?;

        write_event(
            &mut writer,
            Event::Start(BytesStart::new("TransmitterStatus")),
        )?;
        for (name, on) in xmit.flags() {
            write_element(&mut writer, name, &on.to_string())?;
        }
        for (name, value) in xmit.analog() {
            write_element(&mut writer, name, &format!("{value:.3}"))?;
        }
        for fault in TransmitterFault::ALL {
            let history = xmit.fault(fault);
            write_element(
                &mut writer,
                &format!("{}Count", fault.tag()),
                &history.count.to_string(),
            )?;
            write_element(
                &mut writer,
                &format!("{}Time", fault.tag()),
                &history.last_time.to_string(),
            )?;
        }
        write_element(
            &mut writer,
            "autoPulseFaultResets",
            &xmit.auto_pulse_fault_resets.to_string(),
        )?;
        write_event(&mut writer, Event::End(BytesEnd::new("TransmitterStatus")))?;

        write_event(&mut writer, Event::Start(BytesStart::new("ReceiverStatus")))?;
        for (name, value) in rcvr.analog() {
            write_element(&mut writer, name, &format!("{value:.2}"))?;
        }
        for (name, on) in rcvr.flags() {
            write_element(&mut writer, name, &on.to_string())?;
        }
        for id in OscillatorId::ALL {
            write_element(
                &mut writer,
                &format!("osc{}Frequency", id.index()),
                &self.oscillators.frequency_hz(id).to_string(),
            )?;
        }
        write_element(
            &mut writer,
            "derivedTxFrequency",
            &self.oscillators.derived_tx_frequency_hz().to_string(),
        )?;
        write_event(&mut writer, Event::End(BytesEnd::new("ReceiverStatus")))?;

        write_event(&mut writer, Event::End(BytesEnd::new("KaStatus")))?;
        String::from_utf8(writer.into_inner()).map_err(|err| DrxError::Wire(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afc::OscillatorBank;
    use crate::config::OscillatorTable;
    use crate::monitor::{MonitorCache, TransmitterStatus};

    fn aggregator(cache: Arc<MonitorCache>) -> StatusAggregator {
        let table = OscillatorTable::default();
        let mut bank = OscillatorBank::simulated(&table);
        bank.program_initial(&table, true).unwrap();
        StatusAggregator::new(
            cache.clone(),
            cache,
            bank.readout(),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn document_nests_both_blocks() {
        let cache = Arc::new(MonitorCache::new());
        let mut xmit = TransmitterStatus {
            hvps_on: true,
            hvps_voltage: 12.5,
            ..Default::default()
        };
        xmit.fault_mut(TransmitterFault::Blower).count = 3;
        cache.update_transmitter(xmit);

        let xml = aggregator(cache).build_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        let xmit_start = xml.find("<TransmitterStatus>").unwrap();
        let rcvr_start = xml.find("<ReceiverStatus>").unwrap();
        assert!(xmit_start < rcvr_start);
        assert!(xml.contains("<hvpsOn>true</hvpsOn>"));
        assert!(xml.contains("<hvpsVoltage>12.500</hvpsVoltage>"));
        assert!(xml.contains("<blowerFaultCount>3</blowerFaultCount>"));
        assert!(xml.contains("<safetyInterlockTime>-1</safetyInterlockTime>"));
        assert!(xml.contains("<osc2Frequency>16500000000</osc2Frequency>"));
        assert!(xml.contains("<derivedTxFrequency>34632500000</derivedTxFrequency>"));
        assert!(xml.ends_with("</ReceiverStatus></KaStatus>"));
    }

    #[test]
    fn due_once_per_interval() {
        let mut status = aggregator(Arc::new(MonitorCache::new()));
        let start = Instant::now();
        assert!(status.due(start));
        assert!(!status.due(start + Duration::from_millis(1999)));
        assert!(status.due(start + Duration::from_secs(2)));
    }
}
